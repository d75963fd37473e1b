//! Caller side of the storage protocol.

use super::protocol::{read_frame, write_frame, Request, Response};
use crate::error::RpcError;
use crate::types::{NodeSnapshot, Transaction};
use tokio::net::TcpStream;
use tracing::trace;

/// One connection to the storage service.
///
/// Calls are strictly sequential; a failed call leaves the connection in an
/// unknown state and the client should be dropped.
pub struct StorageClient {
    address: String,
    stream: TcpStream,
}

impl StorageClient {
    pub async fn connect(address: &str) -> Result<Self, RpcError> {
        let stream = TcpStream::connect(address)
            .await
            .map_err(|source| RpcError::Connect {
                address: address.to_string(),
                source,
            })?;
        stream.set_nodelay(true)?;
        Ok(Self {
            address: address.to_string(),
            stream,
        })
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn call(&mut self, request: &Request) -> Result<Response, RpcError> {
        trace!(address = %self.address, request = request.name(), "Sending request");
        write_frame(&mut self.stream, request).await?;
        match read_frame(&mut self.stream).await? {
            Some(Response::Error(remote)) => Err(remote.into()),
            Some(response) => Ok(response),
            None => Err(RpcError::Closed),
        }
    }

    /// Apply a batch; returns the operations the service applied.
    pub async fn update(&mut self, transaction: &Transaction) -> Result<Transaction, RpcError> {
        match self.call(&Request::Update(transaction.clone())).await? {
            Response::Updated(applied) => Ok(applied),
            _ => Err(RpcError::UnexpectedResponse("Update")),
        }
    }

    pub async fn delete_list(&mut self, node_id: &str) -> Result<(), RpcError> {
        match self.call(&Request::DeleteList(node_id.to_string())).await? {
            Response::ListDeleted => Ok(()),
            _ => Err(RpcError::UnexpectedResponse("DeleteList")),
        }
    }

    pub async fn list_files(&mut self) -> Result<Vec<NodeSnapshot>, RpcError> {
        match self.call(&Request::ListFiles).await? {
            Response::Files(nodes) => Ok(nodes),
            _ => Err(RpcError::UnexpectedResponse("ListFiles")),
        }
    }
}
