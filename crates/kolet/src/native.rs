//! Builtin native test functions
//!
//! `basic` checks the identifiers the harness compares before and after a
//! reboot: the machine ID must survive, the boot ID must change.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use kolet_core::native::NativeRegistry;

const MACHINE_ID_PATH: &str = "/etc/machine-id";
const BOOT_ID_PATH: &str = "/proc/sys/kernel/random/boot_id";

/// Registry with every builtin test.
pub fn builtin_registry() -> NativeRegistry {
    let mut registry = NativeRegistry::new();
    registry
        .register("basic", "MachineID", || {
            print_id(Path::new(MACHINE_ID_PATH), check_machine_id)
        })
        .register("basic", "BootID", || {
            print_id(Path::new(BOOT_ID_PATH), check_boot_id)
        });
    registry
}

fn print_id(path: &Path, check: fn(&str) -> Result<()>) -> Result<()> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let id = raw.trim();
    check(id).with_context(|| format!("invalid ID in {}", path.display()))?;
    println!("{id}");
    Ok(())
}

/// 32 lowercase hex digits.
fn check_machine_id(id: &str) -> Result<()> {
    if id.len() != 32 || !id.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        bail!("expected 32 lowercase hex digits, got {id:?}");
    }
    if id.bytes().all(|b| b == b'0') {
        bail!("machine ID is all zeros");
    }
    Ok(())
}

/// A UUID in 8-4-4-4-12 form.
fn check_boot_id(id: &str) -> Result<()> {
    let groups: Vec<&str> = id.split('-').collect();
    let lengths: Vec<usize> = groups.iter().map(|g| g.len()).collect();
    if lengths != [8, 4, 4, 4, 12] || !groups.iter().all(|g| g.bytes().all(|b| b.is_ascii_hexdigit())) {
        bail!("expected a UUID, got {id:?}");
    }
    Ok(())
}
