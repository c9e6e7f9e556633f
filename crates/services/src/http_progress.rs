use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode, Url};

use storage::repository::{RemoteProgress, StorageError};
use study_core::model::{DeckId, LearnerId, ProgressSnapshot};

use crate::config::RemoteConfig;

/// Remote progress over HTTP.
///
/// One record per learner and deck at
/// `{base}/learners/{learner}/decks/{deck}/progress`: `GET` reads it (404 means
/// nothing saved yet) and `PUT` overwrites it with the snapshot JSON.
#[derive(Clone)]
pub struct HttpProgressClient {
    client: Client,
    config: RemoteConfig,
}

impl HttpProgressClient {
    #[must_use]
    pub fn new(config: RemoteConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.config.base_url
    }

    fn progress_url(&self, learner: &LearnerId, deck_id: &DeckId) -> Result<Url, StorageError> {
        let mut url = self.config.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                StorageError::Unavailable(format!("bad base url {}", self.config.base_url))
            })?
            .pop_if_empty()
            .extend([
                "learners",
                learner.as_str(),
                "decks",
                deck_id.as_str(),
                "progress",
            ]);
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn http_err(e: reqwest::Error) -> StorageError {
    if e.is_decode() {
        StorageError::Serialization(e.to_string())
    } else {
        StorageError::Connection(e.to_string())
    }
}

fn status_err(status: StatusCode) -> StorageError {
    StorageError::Unavailable(format!("progress endpoint answered {status}"))
}

#[async_trait]
impl RemoteProgress for HttpProgressClient {
    async fn fetch_progress(
        &self,
        learner: &LearnerId,
        deck_id: &DeckId,
    ) -> Result<Option<ProgressSnapshot>, StorageError> {
        let url = self.progress_url(learner, deck_id)?;
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(http_err)?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let snapshot = response.json().await.map_err(http_err)?;
                Ok(Some(snapshot))
            }
            status => Err(status_err(status)),
        }
    }

    async fn write_progress(
        &self,
        learner: &LearnerId,
        snapshot: &ProgressSnapshot,
    ) -> Result<(), StorageError> {
        let url = self.progress_url(learner, &snapshot.deck_id)?;
        let response = self
            .authorize(self.client.put(url))
            .json(snapshot)
            .send()
            .await
            .map_err(http_err)?;

        if !response.status().is_success() {
            return Err(status_err(response.status()));
        }
        Ok(())
    }
}
