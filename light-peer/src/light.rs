use light_remote_shared::{commands, CommandCode};
use tracing::{info, warn};

/// What the simulated light did with one received byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Initialized,
    Power(bool),
    Unknown(CommandCode),
}

/// Power and init flags of a serial-profile light
#[derive(Debug, Default, Clone)]
pub struct LightState {
    pub initialized: bool,
    pub power_on: bool,
    pub received: usize,
}

impl LightState {
    pub fn apply(&mut self, code: CommandCode) -> Applied {
        self.received += 1;
        match code {
            commands::INIT => {
                self.initialized = true;
                info!("[PEER] Link initialized");
                Applied::Initialized
            }
            commands::POWER_ON | commands::POWER_OFF => {
                self.power_on = code == commands::POWER_ON;
                info!("[PEER] Light {}", if self.power_on { "ON" } else { "OFF" });
                Applied::Power(self.power_on)
            }
            other => {
                warn!("[PEER] Unknown command {}", other);
                Applied::Unknown(other)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_toggle() {
        let mut light = LightState::default();
        assert_eq!(light.apply(commands::INIT), Applied::Initialized);
        assert!(light.initialized);
        assert!(!light.power_on);

        assert_eq!(light.apply(commands::POWER_ON), Applied::Power(true));
        assert_eq!(light.apply(commands::POWER_OFF), Applied::Power(false));
        assert!(!light.power_on);
        assert_eq!(light.received, 3);
    }

    #[test]
    fn test_unknown_code_is_ignored() {
        let mut light = LightState::default();
        light.apply(commands::POWER_ON);
        assert_eq!(light.apply(CommandCode(0x2a)), Applied::Unknown(CommandCode(0x2a)));
        assert!(light.power_on);
        assert!(!light.initialized);
    }
}
