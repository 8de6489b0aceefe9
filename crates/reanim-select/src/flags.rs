//! Playback flags of a replacement candidate

/// Candidate flags (1 byte)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CandidateFlags(pub u8);

impl CandidateFlags {
    pub const NONE: CandidateFlags = CandidateFlags(0);

    // Flag bits
    pub const DISABLED: u8 = 0b0000_0001;
    pub const INTERRUPTIBLE: u8 = 0b0000_0010;
    pub const KEEP_RANDOM_RESULTS_ON_LOOP: u8 = 0b0000_0100;
    pub const IGNORE_NO_TRIGGER_FLAG: u8 = 0b0000_1000;
    pub const REPLACE_ON_LOOP: u8 = 0b0001_0000;
    pub const REPLACE_ON_ECHO: u8 = 0b0010_0000;

    #[inline]
    pub fn new(bits: u8) -> Self {
        CandidateFlags(bits)
    }

    #[inline]
    pub fn contains(self, bit: u8) -> bool {
        self.0 & bit != 0
    }

    #[inline]
    pub fn set(&mut self, bit: u8, value: bool) {
        if value {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }

    #[inline]
    pub fn is_disabled(self) -> bool {
        self.contains(Self::DISABLED)
    }

    #[inline]
    pub fn is_interruptible(self) -> bool {
        self.contains(Self::INTERRUPTIBLE)
    }

    #[inline]
    pub fn keeps_random_results_on_loop(self) -> bool {
        self.contains(Self::KEEP_RANDOM_RESULTS_ON_LOOP)
    }

    #[inline]
    pub fn ignores_no_trigger_flag(self) -> bool {
        self.contains(Self::IGNORE_NO_TRIGGER_FLAG)
    }

    #[inline]
    pub fn replaces_on_loop(self) -> bool {
        self.contains(Self::REPLACE_ON_LOOP)
    }

    #[inline]
    pub fn replaces_on_echo(self) -> bool {
        self.contains(Self::REPLACE_ON_ECHO)
    }

    /// Persisted field name of each bit
    pub const FIELDS: [(&'static str, u8); 6] = [
        ("disabled", Self::DISABLED),
        ("interruptible", Self::INTERRUPTIBLE),
        ("keepRandomResultsOnLoop", Self::KEEP_RANDOM_RESULTS_ON_LOOP),
        ("ignoreNoTriggerFlag", Self::IGNORE_NO_TRIGGER_FLAG),
        ("replaceOnLoop", Self::REPLACE_ON_LOOP),
        ("replaceOnEcho", Self::REPLACE_ON_ECHO),
    ];
}

impl Default for CandidateFlags {
    /// Loop and echo replacement on, everything else off
    fn default() -> Self {
        CandidateFlags(Self::REPLACE_ON_LOOP | Self::REPLACE_ON_ECHO)
    }
}

impl From<u8> for CandidateFlags {
    fn from(bits: u8) -> Self {
        CandidateFlags(bits)
    }
}

impl From<CandidateFlags> for u8 {
    fn from(flags: CandidateFlags) -> Self {
        flags.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_operations() {
        let mut flags = CandidateFlags::default();

        assert!(flags.replaces_on_loop());
        assert!(flags.replaces_on_echo());
        assert!(!flags.is_interruptible());

        flags.set(CandidateFlags::INTERRUPTIBLE, true);
        flags.set(CandidateFlags::REPLACE_ON_LOOP, false);
        assert!(flags.is_interruptible());
        assert!(!flags.replaces_on_loop());
        assert!(flags.replaces_on_echo());
    }
}
