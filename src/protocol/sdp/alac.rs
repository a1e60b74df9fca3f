//! Apple Lossless stream parameters carried in `fmtp`

use super::SdpError;

/// Size of the `ALACSpecificConfig` magic cookie
pub const MAGIC_COOKIE_LEN: usize = 24;

/// ALAC format parameters from fmtp line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlacParameters {
    /// Frames per packet
    pub frames_per_packet: u32,
    /// Compatible version
    pub compatible_version: u8,
    /// Bits per sample
    pub bit_depth: u8,
    /// Rice history mult
    pub pb: u8,
    /// Rice initial history
    pub mb: u8,
    /// Rice limit
    pub kb: u8,
    /// Number of channels
    pub channels: u8,
    /// Max run
    pub max_run: u16,
    /// Max frame bytes
    pub max_frame_bytes: u32,
    /// Average bit rate
    pub avg_bit_rate: u32,
    /// Sample rate
    pub sample_rate: u32,
}

impl AlacParameters {
    /// Parse the format options following the format index
    ///
    /// iTunes sends `352 0 16 40 10 14 2 255 0 0 44100`.
    ///
    /// # Errors
    /// Returns `SdpError::InvalidAlacParameters` unless there are exactly
    /// eleven numeric fields.
    pub fn parse<S: AsRef<str>>(options: &[S]) -> Result<Self, SdpError> {
        fn field<T: std::str::FromStr, S: AsRef<str>>(
            options: &[S],
            index: usize,
            name: &str,
        ) -> Result<T, SdpError> {
            let raw = options[index].as_ref();
            raw.parse()
                .map_err(|_| SdpError::InvalidAlacParameters(format!("{name}: {raw}")))
        }

        if options.len() != 11 {
            return Err(SdpError::InvalidAlacParameters(format!(
                "expected 11 fields, got {}",
                options.len()
            )));
        }

        Ok(AlacParameters {
            frames_per_packet: field(options, 0, "frames_per_packet")?,
            compatible_version: field(options, 1, "compatible_version")?,
            bit_depth: field(options, 2, "bit_depth")?,
            pb: field(options, 3, "pb")?,
            mb: field(options, 4, "mb")?,
            kb: field(options, 5, "kb")?,
            channels: field(options, 6, "channels")?,
            max_run: field(options, 7, "max_run")?,
            max_frame_bytes: field(options, 8, "max_frame_bytes")?,
            avg_bit_rate: field(options, 9, "avg_bit_rate")?,
            sample_rate: field(options, 10, "sample_rate")?,
        })
    }

    /// Encode as an `ALACSpecificConfig` magic cookie (big-endian)
    #[must_use]
    pub fn to_magic_cookie(&self) -> [u8; MAGIC_COOKIE_LEN] {
        let mut cookie = [0u8; MAGIC_COOKIE_LEN];
        cookie[0..4].copy_from_slice(&self.frames_per_packet.to_be_bytes());
        cookie[4] = self.compatible_version;
        cookie[5] = self.bit_depth;
        cookie[6] = self.pb;
        cookie[7] = self.mb;
        cookie[8] = self.kb;
        cookie[9] = self.channels;
        cookie[10..12].copy_from_slice(&self.max_run.to_be_bytes());
        cookie[12..16].copy_from_slice(&self.max_frame_bytes.to_be_bytes());
        cookie[16..20].copy_from_slice(&self.avg_bit_rate.to_be_bytes());
        cookie[20..24].copy_from_slice(&self.sample_rate.to_be_bytes());
        cookie
    }
}
