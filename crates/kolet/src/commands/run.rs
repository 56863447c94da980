//! Run command implementation

use anyhow::Result;
use clap::Args;

use crate::native::builtin_registry;

/// Run a native test function
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Test name
    test: String,

    /// Function name within the test
    func: String,
}

/// Execute the run command
pub fn execute(args: RunArgs) -> Result<()> {
    builtin_registry().run(&args.test, &args.func)?;
    Ok(())
}
