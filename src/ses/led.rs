//! Identify/fault LED control through sg_ses, and the timed-locate scope.
//! The timed locate is a guarded acquisition: LED-on acquires, LED-off is
//! the release and runs on timeout, interrupt, early return and panic.

use std::process::Command;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::error::EngineError;
use crate::ses::LocateOutcome;

pub fn sg_ses_present() -> bool {
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|d| d.join("sg_ses").is_file()))
        .unwrap_or(false)
}

pub fn set_ident_led(sg_device: &str, slot: u32, on: bool) -> Result<(), EngineError> {
    set_led(sg_device, slot, "ident", on)
}

pub fn set_fault_led(sg_device: &str, slot: u32, on: bool) -> Result<(), EngineError> {
    set_led(sg_device, slot, "fault", on)
}

fn set_led(sg_device: &str, slot: u32, element: &str, on: bool) -> Result<(), EngineError> {
    if !sg_ses_present() {
        return Err(EngineError::ToolMissing { tool: "sg_ses" });
    }

    let action = if on { format!("--set={}", element) } else { format!("--clear={}", element) };
    let out = Command::new("sg_ses")
        .args([&format!("--dev-slot-num={}", slot), &action, sg_device])
        .output()
        .map_err(|e| EngineError::LedControl {
            sg_device: sg_device.to_string(),
            slot,
            detail: e.to_string(),
        })?;

    if !out.status.success() {
        let text = format!(
            "{}{}",
            String::from_utf8_lossy(&out.stdout),
            String::from_utf8_lossy(&out.stderr)
        );
        let lower = text.to_lowercase();
        if lower.contains("permission denied") || lower.contains("operation not permitted") {
            return Err(EngineError::PermissionDenied(format!(
                "sg_ses on {} slot {}",
                sg_device, slot
            )));
        }
        return Err(EngineError::LedControl {
            sg_device: sg_device.to_string(),
            slot,
            detail: text.trim().to_string(),
        });
    }
    Ok(())
}

/// Holds a lit identify LED. Dropping the guard clears the LED best-effort;
/// `release` clears it with a retry and surfaces the failure.
pub struct LedGuard {
    sg_device: String,
    slot: u32,
    armed: bool,
}

impl LedGuard {
    /// Turn the LED on and arm the guard.
    pub fn acquire(sg_device: &str, slot: u32) -> Result<LedGuard, EngineError> {
        set_ident_led(sg_device, slot, true)?;
        Ok(LedGuard { sg_device: sg_device.to_string(), slot, armed: true })
    }

    /// Explicit LED-off with one retry. A failure here leaves the LED lit,
    /// which the caller must treat as fatal.
    pub fn release(mut self) -> Result<(), EngineError> {
        self.armed = false;
        match set_ident_led(&self.sg_device, self.slot, false) {
            Ok(()) => Ok(()),
            Err(first) => {
                tracing::warn!(
                    sg_device = %self.sg_device,
                    slot = self.slot,
                    error = %first,
                    "LED-off failed, retrying"
                );
                std::thread::sleep(Duration::from_millis(200));
                set_ident_led(&self.sg_device, self.slot, false)
            }
        }
    }
}

impl Drop for LedGuard {
    fn drop(&mut self) {
        if self.armed {
            let _ = set_ident_led(&self.sg_device, self.slot, false);
        }
    }
}

/// Timed locate: LED on, wait for the duration or an interrupt, LED off.
/// The off step runs on every exit path.
pub fn locate_timed(
    sg_device: &str,
    slot: u32,
    duration: Duration,
    interrupt: &AtomicBool,
) -> Result<LocateOutcome, EngineError> {
    let guard = LedGuard::acquire(sg_device, slot)?;

    let started = Instant::now();
    let mut interrupted = false;
    while started.elapsed() < duration {
        if interrupt.load(Ordering::Relaxed) {
            interrupted = true;
            break;
        }
        std::thread::sleep(Duration::from_millis(100));
    }

    guard.release()?;
    Ok(if interrupted { LocateOutcome::Interrupted } else { LocateOutcome::Timeout })
}

#[cfg(test)]
mod tests {
    use super::*;

    // sg_ses is absent in the test environment; the tool-missing path is
    // what these exercise.
    #[test]
    fn missing_tool_is_a_precondition_error() {
        if sg_ses_present() {
            return;
        }
        let err = set_ident_led("/dev/sg12", 5, true).unwrap_err();
        assert!(matches!(err, EngineError::ToolMissing { tool: "sg_ses" }));
        assert_eq!(err.exit_code(), 4);
    }

    #[test]
    fn locate_timed_surfaces_led_on_failure() {
        if sg_ses_present() {
            return;
        }
        let interrupt = AtomicBool::new(false);
        let err =
            locate_timed("/dev/sg12", 5, Duration::from_millis(10), &interrupt).unwrap_err();
        assert!(matches!(err, EngineError::ToolMissing { .. }));
    }
}
