//! Acquire timeout values.

use std::fmt;
use std::time::Duration;

/// How long an acquire call may wait for a contended lock.
///
/// Built from the signed-seconds convention used on the wire and by the
/// store: negative waits forever, zero tries once, positive waits that many
/// seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LockTimeout {
    /// Wait until the lock becomes available.
    #[default]
    Infinite,
    /// Try once and give up immediately.
    NoWait,
    /// Wait up to this many whole seconds.
    Seconds(u32),
}

impl LockTimeout {
    /// Converts signed seconds (`<0` infinite, `0` no-wait, `>0` bounded).
    pub fn from_secs(seconds: i64) -> Self {
        match seconds {
            s if s < 0 => Self::Infinite,
            0 => Self::NoWait,
            s => Self::Seconds(u32::try_from(s).unwrap_or(u32::MAX)),
        }
    }

    /// The signed-seconds form, as passed to `GET_LOCK`.
    pub fn as_secs(&self) -> i64 {
        match self {
            Self::Infinite => -1,
            Self::NoWait => 0,
            Self::Seconds(s) => i64::from(*s),
        }
    }

    /// The bounded wait, or `None` when waiting forever.
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            Self::Infinite => None,
            Self::NoWait => Some(Duration::ZERO),
            Self::Seconds(s) => Some(Duration::from_secs(u64::from(*s))),
        }
    }
}

impl fmt::Display for LockTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Infinite => write!(f, "infinite"),
            Self::NoWait => write!(f, "no-wait"),
            Self::Seconds(s) => write!(f, "{s}s"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signed_seconds() {
        assert_eq!(LockTimeout::from_secs(-1), LockTimeout::Infinite);
        assert_eq!(LockTimeout::from_secs(-30), LockTimeout::Infinite);
        assert_eq!(LockTimeout::from_secs(0), LockTimeout::NoWait);
        assert_eq!(LockTimeout::from_secs(5), LockTimeout::Seconds(5));
        assert_eq!(LockTimeout::Infinite.as_secs(), -1);
        assert_eq!(LockTimeout::Seconds(3).as_secs(), 3);
    }

    #[test]
    fn test_as_duration() {
        assert_eq!(LockTimeout::Infinite.as_duration(), None);
        assert_eq!(LockTimeout::NoWait.as_duration(), Some(Duration::ZERO));
        assert_eq!(
            LockTimeout::Seconds(2).as_duration(),
            Some(Duration::from_secs(2))
        );
    }
}
