//! Binary protocol opcodes.
//!
//! Only the opcodes the client issues are modelled. Every non-quiet opcode has
//! a quiet ("Q") twin that tells the server not to acknowledge success.

/// Opcode of a binary protocol command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    Get = 0x00,
    Set = 0x01,
    Add = 0x02,
    Replace = 0x03,
    Delete = 0x04,
    Increment = 0x05,
    Decrement = 0x06,
    GetQ = 0x09,
    SetQ = 0x11,
    AddQ = 0x12,
    ReplaceQ = 0x13,
    DeleteQ = 0x14,
    IncrementQ = 0x15,
    DecrementQ = 0x16,
}

/// What a successful reply to an opcode carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// UTF-8 value (GET family).
    Value,
    /// Success signal only (SET/ADD/REPLACE/DELETE families).
    Done,
    /// Unsigned 64-bit counter (INCREMENT/DECREMENT families).
    Counter,
}

impl Opcode {
    /// Parse a wire opcode. Returns `None` for opcodes the client never issues.
    pub fn from_u8(code: u8) -> Option<Self> {
        let op = match code {
            0x00 => Self::Get,
            0x01 => Self::Set,
            0x02 => Self::Add,
            0x03 => Self::Replace,
            0x04 => Self::Delete,
            0x05 => Self::Increment,
            0x06 => Self::Decrement,
            0x09 => Self::GetQ,
            0x11 => Self::SetQ,
            0x12 => Self::AddQ,
            0x13 => Self::ReplaceQ,
            0x14 => Self::DeleteQ,
            0x15 => Self::IncrementQ,
            0x16 => Self::DecrementQ,
            _ => return None,
        };
        Some(op)
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// The quiet twin of this opcode (identity for quiet opcodes).
    pub fn quiet(self) -> Self {
        match self {
            Self::Get => Self::GetQ,
            Self::Set => Self::SetQ,
            Self::Add => Self::AddQ,
            Self::Replace => Self::ReplaceQ,
            Self::Delete => Self::DeleteQ,
            Self::Increment => Self::IncrementQ,
            Self::Decrement => Self::DecrementQ,
            quiet => quiet,
        }
    }

    pub fn is_quiet(self) -> bool {
        self.quiet() == self
    }

    pub fn reply_kind(self) -> ReplyKind {
        match self {
            Self::Get | Self::GetQ => ReplyKind::Value,
            Self::Set | Self::SetQ | Self::Add | Self::AddQ => ReplyKind::Done,
            Self::Replace | Self::ReplaceQ | Self::Delete | Self::DeleteQ => ReplyKind::Done,
            Self::Increment | Self::IncrementQ | Self::Decrement | Self::DecrementQ => {
                ReplyKind::Counter
            }
        }
    }

    /// Lowercase name for logs and metric labels.
    pub fn name(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Add => "add",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::Increment => "increment",
            Self::Decrement => "decrement",
            Self::GetQ => "getq",
            Self::SetQ => "setq",
            Self::AddQ => "addq",
            Self::ReplaceQ => "replaceq",
            Self::DeleteQ => "deleteq",
            Self::IncrementQ => "incrementq",
            Self::DecrementQ => "decrementq",
        }
    }
}

impl std::fmt::Display for Opcode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Opcode; 14] = [
        Opcode::Get,
        Opcode::Set,
        Opcode::Add,
        Opcode::Replace,
        Opcode::Delete,
        Opcode::Increment,
        Opcode::Decrement,
        Opcode::GetQ,
        Opcode::SetQ,
        Opcode::AddQ,
        Opcode::ReplaceQ,
        Opcode::DeleteQ,
        Opcode::IncrementQ,
        Opcode::DecrementQ,
    ];

    #[test]
    fn test_wire_codes() {
        assert_eq!(Opcode::Get.code(), 0x00);
        assert_eq!(Opcode::Decrement.code(), 0x06);
        assert_eq!(Opcode::GetQ.code(), 0x09);
        assert_eq!(Opcode::SetQ.code(), 0x11);
        assert_eq!(Opcode::DecrementQ.code(), 0x16);
    }

    #[test]
    fn test_from_u8_matches_code() {
        for op in ALL {
            assert_eq!(Opcode::from_u8(op.code()), Some(op));
        }
        assert_eq!(Opcode::from_u8(0x07), None); // quit
        assert_eq!(Opcode::from_u8(0x0b), None); // version
        assert_eq!(Opcode::from_u8(0xff), None);
    }

    #[test]
    fn test_quiet_twins() {
        assert_eq!(Opcode::Set.quiet(), Opcode::SetQ);
        assert_eq!(Opcode::Delete.quiet(), Opcode::DeleteQ);
        assert_eq!(Opcode::Increment.quiet(), Opcode::IncrementQ);
        assert_eq!(Opcode::SetQ.quiet(), Opcode::SetQ);
        assert!(Opcode::ReplaceQ.is_quiet());
        assert!(!Opcode::Replace.is_quiet());
    }

    #[test]
    fn test_quiet_twin_keeps_reply_kind() {
        for op in ALL {
            assert_eq!(op.quiet().reply_kind(), op.reply_kind(), "{}", op);
        }
    }

    #[test]
    fn test_reply_kinds() {
        assert_eq!(Opcode::Get.reply_kind(), ReplyKind::Value);
        assert_eq!(Opcode::Add.reply_kind(), ReplyKind::Done);
        assert_eq!(Opcode::Delete.reply_kind(), ReplyKind::Done);
        assert_eq!(Opcode::Decrement.reply_kind(), ReplyKind::Counter);
    }
}
