/// 64-bit NTP timestamp as carried in timing and sync packets
///
/// Sender and receiver each stamp packets on their own timeline; the
/// receiver uses its output clock, so only differences between timestamps
/// from the same host mean anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct NtpTimestamp {
    /// Whole seconds
    pub seconds: u32,
    /// Fraction of a second in units of 2^-32
    pub fraction: u32,
}

const FRACTION_SCALE: f64 = 4_294_967_296.0;

impl NtpTimestamp {
    /// Encoded size
    pub const SIZE: usize = 8;

    /// Stamp a point on a local timeline given in seconds
    ///
    /// Negative times clamp to zero.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_secs_f64(secs: f64) -> Self {
        let secs = secs.max(0.0);
        let whole = secs.floor();

        Self {
            seconds: whole as u32,
            fraction: ((secs - whole) * FRACTION_SCALE) as u32,
        }
    }

    /// Seconds on the stamping host's timeline
    #[must_use]
    pub fn to_secs_f64(&self) -> f64 {
        f64::from(self.seconds) + f64::from(self.fraction) / FRACTION_SCALE
    }

    /// Big-endian seconds then fraction
    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[..4].copy_from_slice(&self.seconds.to_be_bytes());
        buf[4..].copy_from_slice(&self.fraction.to_be_bytes());
        buf
    }

    /// Read from the first 8 bytes of `buf`
    ///
    /// # Panics
    /// Panics if `buf` is shorter than 8 bytes; packet decoders check
    /// lengths first.
    #[must_use]
    pub fn decode(buf: &[u8]) -> Self {
        Self {
            seconds: u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]),
            fraction: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
        }
    }
}
