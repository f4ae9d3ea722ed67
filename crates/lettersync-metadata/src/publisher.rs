//! Filesystem publisher.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use lettersync_core::store::write_atomic;
use lettersync_core::{Event, MetadataPublisher, SyncError};

use crate::angles::angle_sequence;

const LETTER_NAME: &str = "ENS Chain Letter";
const LETTER_DESCRIPTION: &str = "A unique token being passed around between ENS community members";
const STAMP_NAME: &str = "ENS Chain Letter Stamp";
const STAMP_DESCRIPTION: &str = "A small prize awarded for passing on the ENS Chain Letter";

/// Renders artwork from an angle sequence (origin first).
///
/// Must be deterministic: the same angles always give the same SVG.
pub trait ArtworkRenderer: Send + Sync {
    fn letter_svg(&self, angles: &[f64]) -> String;
    fn stamp_svg(&self, angles: &[f64]) -> String;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenMetadata {
    pub name: String,
    pub description: String,
    pub image: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryStamp {
    #[serde(rename = "ensNode")]
    pub ens_node: String,
    #[serde(rename = "tokenID")]
    pub token_id: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub stamps: Vec<SummaryStamp>,
}

/// Writes letter and stamp metadata for the current log into a directory.
pub struct FsMetadataPublisher {
    dir: PathBuf,
    base_url: String,
    origin_subject: String,
    renderer: Option<Arc<dyn ArtworkRenderer>>,
}

impl FsMetadataPublisher {
    pub fn new(
        dir: impl Into<PathBuf>,
        base_url: impl Into<String>,
        origin_subject: impl Into<String>,
    ) -> Self {
        Self {
            dir: dir.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            origin_subject: origin_subject.into(),
            renderer: None,
        }
    }

    pub fn with_renderer(mut self, renderer: Arc<dyn ArtworkRenderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn metadata(&self, token_id: u64) -> TokenMetadata {
        let (name, description) = if token_id == 0 {
            (LETTER_NAME, LETTER_DESCRIPTION)
        } else {
            (STAMP_NAME, STAMP_DESCRIPTION)
        };
        TokenMetadata {
            name: name.to_string(),
            description: description.to_string(),
            image: format!("{}/{token_id}.svg", self.base_url),
        }
    }

    async fn write_token(&self, token_id: u64, svg: Option<String>) -> Result<(), SyncError> {
        let json = serde_json::to_vec_pretty(&self.metadata(token_id))?;
        write_atomic(&self.dir.join(token_id.to_string()), &json).await?;
        if let Some(svg) = svg {
            write_atomic(&self.dir.join(format!("{token_id}.svg")), svg.as_bytes()).await?;
        }
        Ok(())
    }

    /// Remove stamp artifacts from `first` onwards, left behind by a retracted event.
    async fn prune_from(&self, first: u64) -> Result<u64, SyncError> {
        let mut token_id = first;
        loop {
            if !remove_if_present(&self.dir.join(token_id.to_string())).await? {
                return Ok(token_id - first);
            }
            remove_if_present(&self.dir.join(format!("{token_id}.svg"))).await?;
            token_id += 1;
        }
    }
}

async fn remove_if_present(path: &Path) -> Result<bool, SyncError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(SyncError::Storage(format!("remove {}: {e}", path.display()))),
    }
}

#[async_trait]
impl MetadataPublisher for FsMetadataPublisher {
    async fn publish(&self, events: &[Event]) -> Result<(), SyncError> {
        let angles = angle_sequence(
            &self.origin_subject,
            events.iter().map(|e| e.subject_id.as_str()),
        )
        .map_err(|e| SyncError::Publish(e.to_string()))?;

        let letter_svg = self.renderer.as_ref().map(|r| r.letter_svg(&angles));
        self.write_token(0, letter_svg).await?;

        for i in 1..=events.len() {
            let stamp_svg = self.renderer.as_ref().map(|r| r.stamp_svg(&angles[..=i]));
            self.write_token(i as u64, stamp_svg).await?;
        }

        let summary = Summary {
            stamps: events
                .iter()
                .enumerate()
                .map(|(i, e)| SummaryStamp {
                    ens_node: e.subject_id.clone(),
                    token_id: i as u64 + 1,
                })
                .collect(),
        };
        let json = serde_json::to_vec_pretty(&summary)?;
        write_atomic(&self.dir.join("summary.json"), &json).await?;

        let pruned = self.prune_from(events.len() as u64 + 1).await?;
        tracing::info!(
            dir = %self.dir.display(),
            stamps = events.len(),
            pruned,
            "metadata published"
        );
        Ok(())
    }
}
