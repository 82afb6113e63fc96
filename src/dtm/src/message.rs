use std::io::{Read, Write};

use serde::{Deserialize, Serialize};

use crate::config::ConfigData;
use crate::vectors::{CompensationVector, ReferenceVector};

/// Update feed payloads: the config transport and the vector transport both
/// speak this enum over a length-framed bincode stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Message {
    Config(ConfigData),
    Reference(ReferenceVector),
    Compensation(CompensationVector),
}

pub fn send_message<W: Write>(writer: &mut W, msg: &Message) -> anyhow::Result<()> {
    let buf = bincode::serialize(msg)?;
    writer.write_all(&(buf.len() as u64).to_be_bytes())?;
    writer.write_all(&buf)?;
    Ok(())
}

pub fn recv_message<R: Read>(reader: &mut R) -> anyhow::Result<Message> {
    let mut len_buf = [0u8; 8];
    reader.read_exact(&mut len_buf)?;
    let len = u64::from_be_bytes(len_buf);
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    let msg = bincode::deserialize(&buf)?;
    Ok(msg)
}
