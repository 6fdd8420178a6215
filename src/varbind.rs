//! Variable bindings.

use crate::ber::{Decoder, EncodeBuf};
use crate::error::Result;
use crate::oid::Oid;
use crate::value::Value;

/// A variable binding: an OID paired with a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarBind {
    pub oid: Oid,
    pub value: Value,
}

impl VarBind {
    /// Create a varbind.
    pub fn new(oid: Oid, value: Value) -> Self {
        Self { oid, value }
    }

    /// Create a varbind with a NULL value (request placeholder).
    pub fn null(oid: Oid) -> Self {
        Self {
            oid,
            value: Value::Null,
        }
    }

    /// Encode as `SEQUENCE { OID, value }`.
    pub fn encode(&self, buf: &mut EncodeBuf) {
        buf.push_sequence(|buf| {
            self.value.encode(buf);
            buf.push_oid(&self.oid);
        });
    }

    /// Decode one varbind.
    pub fn decode(decoder: &mut Decoder) -> Result<Self> {
        let mut seq = decoder.read_sequence()?;
        let oid = seq.read_oid()?;
        let value = Value::decode(&mut seq)?;
        Ok(Self { oid, value })
    }
}

/// Encode a varbind list as `SEQUENCE OF VarBind`.
pub fn encode_varbind_list(buf: &mut EncodeBuf, varbinds: &[VarBind]) {
    buf.push_sequence(|buf| {
        for vb in varbinds.iter().rev() {
            vb.encode(buf);
        }
    });
}

/// Decode a varbind list.
pub fn decode_varbind_list(decoder: &mut Decoder) -> Result<Vec<VarBind>> {
    let mut list = decoder.read_sequence()?;
    let mut varbinds = Vec::new();
    while !list.is_empty() {
        varbinds.push(VarBind::decode(&mut list)?);
    }
    Ok(varbinds)
}
