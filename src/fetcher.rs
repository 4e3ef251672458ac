use log::info;
use std::fs;
use std::path::Path;

use crate::api::IdpApi;
use crate::error::Result;
use crate::schema::CategoryCatalog;

/// Downloads a loan's combined extraction and writes the bytes verbatim to `destination`.
pub async fn download_extraction<A>(api: &A, upload_id: &str, destination: &Path) -> Result<()>
where
    A: IdpApi + ?Sized,
{
    let bytes = api.fetch_extraction(upload_id).await?;
    write_bytes(destination, &bytes)?;
    info!(
        "Successfully downloaded extraction {} to {}",
        upload_id,
        destination.display()
    );
    Ok(())
}

/// Reads the cached category catalog, downloading it to `path` first when absent.
pub async fn load_or_download_categories<A>(api: &A, path: &Path) -> Result<CategoryCatalog>
where
    A: IdpApi + ?Sized,
{
    if !path.exists() {
        info!("Category catalog not cached; downloading to {}", path.display());
        let bytes = api.fetch_categories().await?;
        write_bytes(path, &bytes)?;
    }

    let catalog: CategoryCatalog = serde_json::from_slice(&fs::read(path)?)?;
    info!("Loaded {} document categories", catalog.categories.len());
    Ok(catalog)
}

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::testing::FakeIdp;

    #[tokio::test]
    async fn test_download_writes_raw_bytes_and_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let mut api = FakeIdp::new();
        let body = br#"{"results": []}"#.to_vec();
        api.extractions.insert("upload-7".to_string(), body.clone());

        let dest = dir.path().join("Actual").join("100234.json");
        download_extraction(&api, "upload-7", &dest).await.unwrap();
        assert_eq!(fs::read(&dest).unwrap(), body);
    }

    #[tokio::test]
    async fn test_download_failure_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let api = FakeIdp::new();
        let dest = dir.path().join("missing.json");

        let err = download_extraction(&api, "unknown", &dest).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ItemTerminal);
        assert!(!dest.exists());
    }

    #[tokio::test]
    async fn test_categories_are_downloaded_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categories.json");
        let mut api = FakeIdp::new();
        api.categories =
            br#"{"categories": [{"documentCategory": "Appraisal", "uid": "c-1"}]}"#.to_vec();

        let catalog = load_or_download_categories(&api, &path).await.unwrap();
        assert_eq!(catalog.uid_for("Appraisal"), Some("c-1"));
        assert!(path.exists());

        // A cached file wins over whatever the service would return now.
        api.categories = br#"{"categories": []}"#.to_vec();
        let catalog = load_or_download_categories(&api, &path).await.unwrap();
        assert_eq!(catalog.categories.len(), 1);
    }
}
