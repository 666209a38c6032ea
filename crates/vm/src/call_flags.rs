//! Capability flags carried by every call frame.

use bitflags::bitflags;

bitflags! {
    /// What a loaded script is allowed to do. A callee always runs with the
    /// intersection of its caller's flags and its own declared requirements.
    #[derive(Default, Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CallFlags: u8 {
        const NONE = 0b0000_0000;
        /// Read chain and contract state.
        const READ_STATES = 0b0000_0001;
        /// Mutate contract state.
        const WRITE_STATES = 0b0000_0010;
        /// Invoke other contracts.
        const ALLOW_CALL = 0b0000_0100;
        /// Emit notifications.
        const ALLOW_NOTIFY = 0b0000_1000;
    }
}

impl CallFlags {
    pub const STATES: CallFlags = CallFlags::READ_STATES.union(CallFlags::WRITE_STATES);
    pub const READ_ONLY: CallFlags = CallFlags::READ_STATES.union(CallFlags::ALLOW_CALL);
    pub const ALL: CallFlags = CallFlags::STATES
        .union(CallFlags::ALLOW_CALL)
        .union(CallFlags::ALLOW_NOTIFY);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composites() {
        assert_eq!(CallFlags::ALL.bits(), 0b1111);
        assert!(CallFlags::READ_ONLY.contains(CallFlags::READ_STATES));
        assert!(!CallFlags::READ_ONLY.contains(CallFlags::WRITE_STATES));
    }

    #[test]
    fn unknown_bits_rejected() {
        assert!(CallFlags::from_bits(0x10).is_none());
    }
}
