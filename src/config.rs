//! Construction-time tunables for a [`crate::control::ControlBlock`].
//!
//! Every field here also has a matching setter on the control block itself
//! (mirroring how a connection-control-block struct elsewhere in this
//! codebase's lineage exposes both direct field setters and a bundle struct
//! for callers that want to build configuration up front, e.g. from a file
//! or CLI flags, before the connection exists).

pub const MTU_DEFAULT: usize = 1400;
pub const OVERHEAD: usize = crate::segment::HEADER_LEN;

pub const WND_SND_DEFAULT: u16 = 32;
pub const WND_RCV_DEFAULT: u16 = 128;

pub const INTERVAL_DEFAULT: u32 = 100;
pub const INTERVAL_MIN: u32 = 10;
pub const INTERVAL_MAX: u32 = 5000;

pub const RTO_DEF: u32 = 200;
pub const RTO_MIN: u32 = 100;
pub const RTO_NDL_MIN: u32 = 30;
pub const RTO_MAX: u32 = 60_000;

pub const THRESH_INIT: u32 = 2;
pub const THRESH_MIN: u32 = 2;

pub const PROBE_INIT: u32 = 7_000;
pub const PROBE_LIMIT: u32 = 120_000;

pub const FASTACK_LIMIT_DEFAULT: u32 = 5;
pub const DEADLINK_DEFAULT: u32 = 20;

pub const ASK_SEND: u32 = 1;
pub const ASK_TELL: u32 = 2;

/// 0, 1 or 2: progressively less patient retransmission behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoDelay {
    #[default]
    Off,
    On,
    Aggressive,
}

impl NoDelay {
    pub(crate) fn min_rto(self) -> u32 {
        match self {
            NoDelay::Off => RTO_MIN,
            NoDelay::On | NoDelay::Aggressive => RTO_NDL_MIN,
        }
    }

    pub(crate) fn is_enabled(self) -> bool {
        !matches!(self, NoDelay::Off)
    }
}

/// Bundled configuration for [`crate::control::ControlBlock::with_config`].
///
/// Every field defaults to the values §3.2/§6.3 of the protocol lay out;
/// embedders that only need to tweak one or two values should prefer the
/// individual setters (`set_mtu`, `set_interval`, `set_nodelay`,
/// `set_wndsize`) over constructing this directly.
#[derive(Debug, Clone)]
pub struct Config {
    pub mtu: usize,
    pub interval: u32,
    pub nodelay: NoDelay,
    pub fastresend: u32,
    pub fastlimit: u32,
    pub nocwnd: bool,
    pub stream: bool,
    pub snd_wnd: u16,
    pub rcv_wnd: u16,
    pub dead_link: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mtu: MTU_DEFAULT,
            interval: INTERVAL_DEFAULT,
            nodelay: NoDelay::Off,
            fastresend: 0,
            fastlimit: FASTACK_LIMIT_DEFAULT,
            nocwnd: false,
            stream: false,
            snd_wnd: WND_SND_DEFAULT,
            rcv_wnd: WND_RCV_DEFAULT,
            dead_link: DEADLINK_DEFAULT,
        }
    }
}
