//! Best-effort files written next to a download

use crate::data::Video;
use crate::error::AppResult;
use crate::queue::job::with_suffix;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Which thumbnails to keep as `(source index, file number)`.
///
/// Long videos usually carry four thumbnails and the second tends to be an
/// intro screen, so the first and third are preferred.
pub fn thumbnail_picks(count: usize) -> Vec<(usize, usize)> {
    match count {
        0 => vec![],
        1 => vec![(0, 1)],
        2 => vec![(0, 1), (1, 2)],
        _ => vec![(0, 1), (2, 2)],
    }
}

/// Write the video descriptor to `<output>.json`
pub async fn save_metadata(video: &Video, output: &Path) -> AppResult<PathBuf> {
    let path = with_suffix(output, ".json");
    let json = serde_json::to_string_pretty(video)?;
    tokio::fs::write(&path, json).await?;

    debug!("Saved metadata to {}", path.display());
    Ok(path)
}

/// Fetch the picked thumbnails to `<output>-1.jpg` and `<output>-2.jpg`.
///
/// Each fetch is independent; a failed one is logged, its partial file
/// removed, and left out of the returned paths.
pub async fn save_thumbnails(
    client: &reqwest::Client,
    video: &Video,
    output: &Path,
) -> Vec<PathBuf> {
    let fetches = thumbnail_picks(video.thumbnails.len())
        .into_iter()
        .map(|(index, number)| {
            let url = video.thumbnails[index].url.as_str();
            let path = with_suffix(output, &format!("-{}.jpg", number));
            async move {
                match fetch(client, url, &path).await {
                    Ok(()) => Some(path),
                    Err(e) => {
                        warn!("Error saving thumbnail #{} from {}: {}", number, url, e);
                        let _ = tokio::fs::remove_file(&path).await;
                        None
                    }
                }
            }
        });

    join_all(fetches).await.into_iter().flatten().collect()
}

async fn fetch(client: &reqwest::Client, url: &str, path: &Path) -> AppResult<()> {
    let bytes = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?;
    tokio::fs::write(path, &bytes).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Thumbnail;
    use crate::data::tests::sample_video;

    #[test]
    fn test_thumbnail_picks() {
        assert!(thumbnail_picks(0).is_empty());
        assert_eq!(thumbnail_picks(1), vec![(0, 1)]);
        assert_eq!(thumbnail_picks(2), vec![(0, 1), (1, 2)]);
        assert_eq!(thumbnail_picks(3), vec![(0, 1), (2, 2)]);
        assert_eq!(thumbnail_picks(4), vec![(0, 1), (2, 2)]);
    }

    #[tokio::test]
    async fn test_metadata_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let video = sample_video();

        let path = save_metadata(&video, &dir.path().join("run")).await.unwrap();
        assert_eq!(path, dir.path().join("run.json"));

        let loaded = Video::from_file(&path).unwrap();
        assert_eq!(loaded, video);
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"_id\": \"v123\""));
    }

    #[tokio::test]
    async fn test_failed_thumbnail_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut video = sample_video();
        video.thumbnails = vec![Thumbnail {
            url: "http://127.0.0.1:9/missing.jpg".to_string(),
        }];

        let client = reqwest::Client::new();
        let saved = save_thumbnails(&client, &video, &dir.path().join("run")).await;

        assert!(saved.is_empty());
        assert!(!dir.path().join("run-1.jpg").exists());
    }
}
