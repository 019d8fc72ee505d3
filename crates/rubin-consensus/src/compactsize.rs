//! CompactSize codec. Decoding rejects non-minimal forms at every site:
//! this check is consensus-critical.

use crate::error::{ErrorCode, TxError};
use crate::wire_read::Reader;

/// Append the minimal CompactSize encoding of `n` to `out`.
pub fn encode_compact_size(n: u64, out: &mut Vec<u8>) {
    if n < 0xfd {
        out.push(n as u8);
    } else if n <= 0xffff {
        out.push(0xfd);
        out.extend_from_slice(&(n as u16).to_le_bytes());
    } else if n <= 0xffff_ffff {
        out.push(0xfe);
        out.extend_from_slice(&(n as u32).to_le_bytes());
    } else {
        out.push(0xff);
        out.extend_from_slice(&n.to_le_bytes());
    }
}

/// Encoded length of CompactSize(n) in bytes.
pub fn compact_size_len(n: u64) -> u64 {
    match n {
        0x00..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Read a CompactSize from a cursor. Non-minimal forms fail with
/// `TX_ERR_PARSE`, the token every parser site surfaces.
pub fn read_compact_size(r: &mut Reader<'_>) -> Result<(u64, usize), TxError> {
    let start = r.offset();
    let tag = r.read_u8()?;

    let (v, minimal_ok) = match tag {
        0x00..=0xfc => (tag as u64, true),
        0xfd => {
            let v = r.read_u16_le()? as u64;
            (v, v >= 0xfd)
        }
        0xfe => {
            let v = r.read_u32_le()? as u64;
            (v, v > 0xffff)
        }
        0xff => {
            let v = r.read_u64_le()?;
            (v, v > 0xffff_ffff)
        }
    };

    if !minimal_ok {
        return Err(TxError::new(
            ErrorCode::TxErrParse,
            "non-minimal CompactSize",
        ));
    }

    Ok((v, r.offset() - start))
}

/// Decode a CompactSize from the front of a byte slice. Standalone codec
/// entry point; non-minimal forms get the dedicated codec token.
pub fn compact_size_decode(bytes: &[u8]) -> Result<(u64, usize), TxError> {
    let mut r = Reader::new(bytes);
    match read_compact_size(&mut r) {
        Ok(v) => Ok(v),
        Err(e) if e.msg == "non-minimal CompactSize" => Err(TxError::new(
            ErrorCode::TxErrCompactSizeNonMinimal,
            "non-minimal CompactSize",
        )),
        Err(e) => Err(e),
    }
}
