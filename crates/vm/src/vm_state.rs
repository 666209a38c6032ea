//! Engine state machine.

/// The four observable states of the engine.
///
/// `None` is the initial and running state; `Break` is reserved for
/// debugger-driven stepping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VmState {
    None,
    Halt,
    Fault,
    Break,
}

impl VmState {
    /// A byte form used when the state is persisted next to a transaction.
    pub fn to_byte(self) -> u8 {
        match self {
            VmState::None => 0x00,
            VmState::Halt => 0x01,
            VmState::Fault => 0x02,
            VmState::Break => 0x04,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(VmState::None),
            0x01 => Some(VmState::Halt),
            0x02 => Some(VmState::Fault),
            0x04 => Some(VmState::Break),
            _ => None,
        }
    }
}

impl std::fmt::Display for VmState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VmState::None => "NONE",
            VmState::Halt => "HALT",
            VmState::Fault => "FAULT",
            VmState::Break => "BREAK",
        };
        f.write_str(name)
    }
}
