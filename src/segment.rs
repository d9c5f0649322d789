use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::Error;

/// cmd: push data
pub const CMD_PUSH: u8 = 81;
/// cmd: cumulative + selective ack
pub const CMD_ACK: u8 = 82;
/// cmd: window probe (ask)
pub const CMD_WASK: u8 = 83;
/// cmd: window size (tell)
pub const CMD_WINS: u8 = 84;

/// conv(4) cmd(1) frg(1) wnd(2) ts(4) sn(4) una(4) len(4)
pub const HEADER_LEN: usize = 24;

/// One wire record plus the bookkeeping fields the control block keeps
/// per in-flight segment. Only the first eight fields are ever put on the
/// wire; `resendts`, `rto`, `fastack` and `xmit` are local state.
#[derive(Debug, Clone, Default)]
pub struct Segment {
    pub conv: u32,
    pub cmd: u8,
    pub frg: u8,
    pub wnd: u16,
    pub ts: u32,
    pub sn: u32,
    pub una: u32,
    pub data: Bytes,

    pub resendts: u32,
    pub rto: u32,
    pub fastack: u32,
    pub xmit: u32,
}

impl Segment {
    pub fn with_data(data: Bytes) -> Self {
        Segment {
            data,
            ..Default::default()
        }
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.data.len()
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        debug_assert!(buf.remaining_mut() >= self.encoded_len());

        buf.put_u32_le(self.conv);
        buf.put_u8(self.cmd);
        buf.put_u8(self.frg);
        buf.put_u16_le(self.wnd);
        buf.put_u32_le(self.ts);
        buf.put_u32_le(self.sn);
        buf.put_u32_le(self.una);
        buf.put_u32_le(self.data.len() as u32);
        buf.put_slice(&self.data);
    }

    /// Decode one (header, payload) record from the front of `buf`, advancing
    /// it past the record. Returns `Ok(None)` when fewer than `HEADER_LEN`
    /// bytes remain (the normal end-of-datagram condition, not an error).
    pub fn decode(buf: &mut impl Buf) -> Result<Option<Segment>, Error> {
        if buf.remaining() < HEADER_LEN {
            if buf.remaining() == 0 {
                return Ok(None);
            }
            return Err(Error::TruncatedHeader {
                remaining: buf.remaining(),
            });
        }

        let conv = buf.get_u32_le();
        let cmd = buf.get_u8();
        let frg = buf.get_u8();
        let wnd = buf.get_u16_le();
        let ts = buf.get_u32_le();
        let sn = buf.get_u32_le();
        let una = buf.get_u32_le();
        let len = buf.get_u32_le() as usize;

        match cmd {
            CMD_PUSH | CMD_ACK | CMD_WASK | CMD_WINS => {}
            _ => return Err(Error::UnknownCommand { cmd }),
        }

        if buf.remaining() < len {
            return Err(Error::TruncatedPayload {
                declared: len,
                remaining: buf.remaining(),
            });
        }

        let data = buf.copy_to_bytes(len);

        Ok(Some(Segment {
            conv,
            cmd,
            frg,
            wnd,
            ts,
            sn,
            una,
            data,
            resendts: 0,
            rto: 0,
            fastack: 0,
            xmit: 0,
        }))
    }

    /// The sn of the last byte in this segment's payload, used nowhere in the
    /// message-mode engine directly but kept alongside for parity with the
    /// byte-sequence reasoning used elsewhere in this codebase's lineage.
    pub fn end_sn(&self) -> u32 {
        self.sn
    }
}

/// Read the `conv` field out of the first record of a raw datagram, without
/// otherwise parsing it. Used by embedders to demultiplex an inbound
/// datagram to the right control block before calling `input`.
pub fn peek_conv(buf: &[u8]) -> Option<u32> {
    if buf.len() < 4 {
        return None;
    }
    Some(u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]))
}
