//! MAC engine error types

use thiserror::Error;

use crate::lorawan::Cid;

/// Result type for MAC engine operations
pub type Result<T> = std::result::Result<T, MacError>;

/// Errors returned by the MAC command handlers and schedulers
#[derive(Error, Debug)]
pub enum MacError {
    /// Handler invoked without a command payload
    #[error("no MAC command payload")]
    NoPayload,

    /// The device sent something the protocol does not allow
    #[error("invalid MAC command payload: {0}")]
    InvalidPayload(String),

    /// An answer arrived for a request that was never sent
    #[error("no pending request found for CID {cid}")]
    RequestNotFound { cid: Cid },

    /// Persisted device state disagrees with the band or with what was sent
    #[error("corrupted MAC state: {0}")]
    CorruptedMacState(#[from] Corruption),

    /// Channel mask vectors the band cannot express
    #[error("unsupported channel mask: current has {current} channels, desired has {desired}")]
    UnsupportedChannelMask { current: usize, desired: usize },

    /// The frequency plan does not fit its band
    #[error("invalid frequency plan: {0}")]
    InvalidFrequencyPlan(String),

    /// Wire encoding or decoding failed
    #[error("MAC command encoding: {0}")]
    Encoding(String),

    /// The relay key derivation service failed
    #[error("relay key derivation failed")]
    RelayKeys(#[source] anyhow::Error),
}

/// Details of a corrupted MAC state, with the values needed to diagnose it
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Corruption {
    #[error("{len} channels exceed the band maximum of {max}")]
    TooManyChannels { len: usize, max: usize },

    #[error("channel {index} is not defined ({channels_len} channels)")]
    UndefinedChannel { index: usize, channels_len: usize },

    #[error("channel {index} is enabled without an uplink frequency")]
    EnabledWithoutFrequency { index: usize },

    #[error("channel index {index} exceeds the band maximum of {max}")]
    ChannelIndexOutOfRange { index: usize, max: usize },

    #[error("allowed data rate range is empty (min {min}, max {max})")]
    EmptyDataRateRange { min: u8, max: u8 },

    #[error("desired data rate {index} outside allowed range {min}..={max}")]
    DataRateOutOfRange { index: u8, min: u8, max: u8 },

    #[error("data rate {index} is not defined by the band")]
    UnknownDataRate { index: u8 },

    #[error("Tx power index {index} exceeds the band maximum of {max}")]
    TxPowerOutOfRange { index: u8, max: u8 },

    #[error("NbTrans {nb_trans} is outside 1..=15")]
    InvalidNbTrans { nb_trans: u8 },

    #[error("channel mask control {control} is not valid for the band")]
    InvalidChannelMaskControl { control: u8 },

    #[error("pending request for CID {cid} does not match its answer")]
    RequestMismatch { cid: Cid },
}
