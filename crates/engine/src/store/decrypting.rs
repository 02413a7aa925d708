//! Channel reads with sensitive properties opened on the way out.

use std::sync::Arc;

use async_trait::async_trait;
use courier_common::types::Channel;
use courier_notifier::PropertyCrypto;
use uuid::Uuid;

use super::{ChannelStore, StoreError};

pub struct DecryptingChannelStore {
    inner: Arc<dyn ChannelStore>,
    crypto: Arc<PropertyCrypto>,
}

impl DecryptingChannelStore {
    pub fn new(inner: Arc<dyn ChannelStore>, crypto: Arc<PropertyCrypto>) -> Self {
        Self { inner, crypto }
    }
}

#[async_trait]
impl ChannelStore for DecryptingChannelStore {
    async fn get(&self, id: Uuid) -> Result<Option<Channel>, StoreError> {
        let Some(mut channel) = self.inner.get(id).await? else {
            return Ok(None);
        };
        channel.properties = self
            .crypto
            .decrypt_sensitive(&channel.properties)
            .map_err(|source| StoreError::Undecryptable { id, source })?;
        Ok(Some(channel))
    }
}
