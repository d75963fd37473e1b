//! Node <-> storage wire protocol.
//!
//! Every message is a 4-byte big-endian length followed by a bincode payload.
//! A connection carries any number of request/response pairs, one at a time.

use crate::error::{RemoteError, RpcError};
use crate::types::{NodeId, NodeSnapshot, Operation, Transaction};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::ErrorKind;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted payload
pub const MAX_FRAME: usize = 64 * 1024 * 1024;

/// Calls a client can make on the storage service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    Update(Transaction),
    DeleteList(NodeId),
    ListFiles,
}

impl Request {
    pub fn name(&self) -> &'static str {
        match self {
            Request::Update(_) => "Update",
            Request::DeleteList(_) => "DeleteList",
            Request::ListFiles => "ListFiles",
        }
    }
}

/// Storage service replies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    /// Operations applied by an Update
    Updated(Transaction),
    ListDeleted,
    Files(Vec<NodeSnapshot>),
    Error(RemoteError),
}

/// Split `operations` into consecutive runs whose `Update` frames each fit in
/// `limit` bytes, keeping their order. An operation too large for any frame
/// travels alone and is refused by `write_frame`.
pub fn split_update(
    node_id: &str,
    operations: Vec<Operation>,
    limit: usize,
) -> VecDeque<Vec<Operation>> {
    let overhead = encoded_len(&Request::Update(Transaction {
        node_id: node_id.to_string(),
        operations: Vec::new(),
    }));

    let mut chunks = VecDeque::new();
    let mut current = Vec::new();
    let mut size = overhead;
    for op in operations {
        let op_len = encoded_len(&op);
        if !current.is_empty() && size.saturating_add(op_len) > limit {
            chunks.push_back(std::mem::take(&mut current));
            size = overhead;
        }
        size = size.saturating_add(op_len);
        current.push(op);
    }
    if !current.is_empty() {
        chunks.push_back(current);
    }
    chunks
}

fn encoded_len<T: Serialize>(value: &T) -> usize {
    bincode::serialized_size(value).map_or(usize::MAX, |len| len as usize)
}

/// Write one length-prefixed message and flush it.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), RpcError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let payload = bincode::serialize(message)?;
    if payload.len() > MAX_FRAME {
        return Err(RpcError::FrameTooLarge(payload.len()));
    }
    writer.write_all(&(payload.len() as u32).to_be_bytes()).await?;
    writer.write_all(&payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed message.
///
/// Returns `Ok(None)` when the peer closed the connection cleanly between
/// messages.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>, RpcError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME {
        return Err(RpcError::FrameTooLarge(len));
    }

    let mut payload = vec![0u8; len];
    match reader.read_exact(&mut payload).await {
        Ok(_) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Err(RpcError::Closed),
        Err(e) => return Err(e.into()),
    }
    Ok(Some(bincode::deserialize(&payload)?))
}
