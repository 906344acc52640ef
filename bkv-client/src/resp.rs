//! # RESP2 Wire Codec
//!
//! Purpose: Frame backend commands and read replies for the TCP backend
//! connection.
//!
//! ## Design Principles
//! 1. **Binary-Safe Payloads**: Object bodies travel as bulk strings, untouched.
//! 2. **Caller-Owned Buffers**: The connection keeps its scratch buffers alive
//!    across commands.
//! 3. **Fail Fast**: Any framing violation is a `Protocol` error and poisons the
//!    connection.

use std::io::{BufRead, Write};

use crate::error::{ClientError, ClientResult};

/// Largest bulk payload accepted from the backend (512 MiB, the RESP2 limit).
const MAX_BULK_LEN: i64 = 512 * 1024 * 1024;

/// One decoded reply frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespValue {
    /// `+OK`
    Simple(String),
    /// `-ERR message`
    Error(String),
    /// `:42`
    Integer(i64),
    /// `$n`, `None` for the null bulk string.
    Bulk(Option<Vec<u8>>),
}

/// Appends `args` to `out` as a RESP2 array of bulk strings.
pub fn encode_command(args: &[&[u8]], out: &mut Vec<u8>) {
    // Writing into a Vec cannot fail.
    let _ = write!(out, "*{}\r\n", args.len());
    for arg in args {
        let _ = write!(out, "${}\r\n", arg.len());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
}

/// Reads exactly one reply frame from `reader`.
///
/// `scratch` holds the header line and is cleared on every call.
pub fn read_response<R: BufRead>(reader: &mut R, scratch: &mut Vec<u8>) -> ClientResult<RespValue> {
    read_header(reader, scratch)?;
    let (tag, body) = match scratch.split_first() {
        Some((tag, body)) => (*tag, body),
        None => return Err(ClientError::Protocol),
    };

    match tag {
        b'+' => Ok(RespValue::Simple(String::from_utf8_lossy(body).into_owned())),
        b'-' => Ok(RespValue::Error(String::from_utf8_lossy(body).into_owned())),
        b':' => parse_int(body).map(RespValue::Integer),
        b'$' => {
            let len = parse_int(body)?;
            read_bulk(reader, len)
        }
        // No object command replies with an array, so `*` is a framing error too.
        _ => Err(ClientError::Protocol),
    }
}

fn read_bulk<R: BufRead>(reader: &mut R, len: i64) -> ClientResult<RespValue> {
    if len < 0 {
        return Ok(RespValue::Bulk(None));
    }
    if len > MAX_BULK_LEN {
        return Err(ClientError::Protocol);
    }
    // Payload plus trailing CRLF in one read.
    let mut data = vec![0u8; len as usize + 2];
    reader.read_exact(&mut data)?;
    if !data.ends_with(b"\r\n") {
        return Err(ClientError::Protocol);
    }
    data.truncate(len as usize);
    Ok(RespValue::Bulk(Some(data)))
}

fn read_header<R: BufRead>(reader: &mut R, line: &mut Vec<u8>) -> ClientResult<()> {
    line.clear();
    if reader.read_until(b'\n', line)? == 0 {
        return Err(ClientError::Protocol);
    }
    if !line.ends_with(b"\r\n") {
        return Err(ClientError::Protocol);
    }
    line.truncate(line.len() - 2);
    Ok(())
}

fn parse_int(digits: &[u8]) -> ClientResult<i64> {
    std::str::from_utf8(digits)
        .ok()
        .and_then(|text| text.parse::<i64>().ok())
        .ok_or(ClientError::Protocol)
}
