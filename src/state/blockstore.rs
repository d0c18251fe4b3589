//! File backed cursor store

use crate::error::{RelayerError, RelayerResult};

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Default location under the home directory
pub const PATH_POSTFIX: &str = ".chainbridge/blockstore";

/// Persists the position a connector resumes from
#[async_trait]
pub trait Blockstorer: Send + Sync {
    async fn store_block(&self, block: u64) -> RelayerResult<()>;
    async fn store_signature(&self, signature: &str) -> RelayerResult<()>;
}

/// No-op store for tests and dry runs
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyStore;

#[async_trait]
impl Blockstorer for EmptyStore {
    async fn store_block(&self, _block: u64) -> RelayerResult<()> {
        Ok(())
    }

    async fn store_signature(&self, _signature: &str) -> RelayerResult<()> {
        Ok(())
    }
}

/// One file per (relayer, chain) pair holding a decimal block height or a
/// raw signature. Every store overwrites the previous value.
#[derive(Debug, Clone)]
pub struct Blockstore {
    /// Directory holding the file
    path: PathBuf,
    full_path: PathBuf,
    chain: String,
    relayer: String,
}

impl Blockstore {
    /// Passing `None` for `path` uses `$HOME/.chainbridge/blockstore`
    pub fn new(path: Option<PathBuf>, chain: &str, relayer: &str) -> RelayerResult<Self> {
        let path = match path {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => default_path()?,
        };
        let full_path = path.join(file_name(chain, relayer));

        Ok(Self {
            path,
            full_path,
            chain: chain.to_string(),
            relayer: relayer.to_string(),
        })
    }

    pub fn file_path(&self) -> &Path {
        &self.full_path
    }

    /// Load the last stored block, 0 if nothing was stored yet
    pub async fn try_load_latest_block(&self) -> RelayerResult<u64> {
        let data = match self.read().await? {
            Some(data) => data,
            None => return Ok(0),
        };
        let data = data.trim();
        if data.is_empty() {
            return Ok(0);
        }
        data.parse::<u64>()
            .map_err(|_| RelayerError::BlockParse(data.to_string()))
    }

    /// Load the last stored signature, empty if nothing was stored yet
    pub async fn try_load_latest_signature(&self) -> RelayerResult<String> {
        Ok(self.read().await?.unwrap_or_default())
    }

    /// Block to resume from: the stored block or `start_block`, whichever
    /// is larger
    pub async fn resume_block(&self, start_block: u64) -> RelayerResult<u64> {
        let latest = self.try_load_latest_block().await?;
        Ok(latest.max(start_block))
    }

    async fn read(&self) -> RelayerResult<Option<String>> {
        match fs::read_to_string(&self.full_path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, data: &[u8]) -> RelayerResult<()> {
        fs::create_dir_all(&self.path).await?;

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options.open(&self.full_path).await?;
        file.write_all(data).await?;
        file.flush().await?;

        // files created before the mode was enforced
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.full_path, std::fs::Permissions::from_mode(0o600)).await?;
        }

        Ok(())
    }
}

#[async_trait]
impl Blockstorer for Blockstore {
    async fn store_block(&self, block: u64) -> RelayerResult<()> {
        self.write(block.to_string().as_bytes()).await?;
        debug!(
            "Saved block {} for chain {} relayer {}",
            block, self.chain, self.relayer
        );
        Ok(())
    }

    async fn store_signature(&self, signature: &str) -> RelayerResult<()> {
        self.write(signature.as_bytes()).await?;
        debug!(
            "Saved signature for chain {} relayer {}",
            self.chain, self.relayer
        );
        Ok(())
    }
}

fn file_name(chain: &str, relayer: &str) -> String {
    format!("{}-{}.block", relayer, chain)
}

fn default_path() -> RelayerResult<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| RelayerError::Config("cannot determine home directory".to_string()))?;
    Ok(home.join(PATH_POSTFIX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    fn store(dir: &Path) -> Blockstore {
        Blockstore::new(Some(dir.join("nested").join("store")), "ATOM", "relayer-1").unwrap()
    }

    #[tokio::test]
    async fn test_empty_store_loads_zero() {
        let dir = tempfile::tempdir().unwrap();
        let bs = store(dir.path());
        assert_eq!(bs.try_load_latest_block().await.unwrap(), 0);
        assert_eq!(bs.try_load_latest_signature().await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_store_overwrites_without_max() {
        let dir = tempfile::tempdir().unwrap();
        let bs = store(dir.path());

        assert_ok!(bs.store_block(42).await);
        assert_eq!(bs.try_load_latest_block().await.unwrap(), 42);

        assert_ok!(bs.store_block(1).await);
        assert_eq!(bs.try_load_latest_block().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_file_layout() {
        let dir = tempfile::tempdir().unwrap();
        let bs = store(dir.path());
        bs.store_block(1234).await.unwrap();

        assert!(bs.file_path().ends_with("relayer-1-ATOM.block"));
        let raw = std::fs::read_to_string(bs.file_path()).unwrap();
        assert_eq!(raw, "1234");

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(bs.file_path()).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_existing_world_readable_file_is_tightened() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let bs = store(dir.path());
        std::fs::create_dir_all(bs.file_path().parent().unwrap()).unwrap();
        std::fs::write(bs.file_path(), "99999").unwrap();
        std::fs::set_permissions(bs.file_path(), std::fs::Permissions::from_mode(0o644)).unwrap();

        bs.store_block(7).await.unwrap();
        let mode = std::fs::metadata(bs.file_path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(bs.try_load_latest_block().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_signature_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let bs = store(dir.path());
        bs.store_signature("5xSig").await.unwrap();
        assert_eq!(bs.try_load_latest_signature().await.unwrap(), "5xSig");
    }

    #[tokio::test]
    async fn test_resume_takes_larger_block() {
        let dir = tempfile::tempdir().unwrap();
        let bs = store(dir.path());
        assert_eq!(bs.resume_block(100).await.unwrap(), 100);

        bs.store_block(250).await.unwrap();
        assert_eq!(bs.resume_block(100).await.unwrap(), 250);
        assert_eq!(bs.resume_block(300).await.unwrap(), 300);
    }

    #[tokio::test]
    async fn test_garbage_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let bs = store(dir.path());
        bs.store_signature("not-a-number").await.unwrap();
        let err = bs.try_load_latest_block().await.unwrap_err();
        assert!(matches!(err, RelayerError::BlockParse(_)));
    }

    #[tokio::test]
    async fn test_unwritable_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, "x").unwrap();

        let bs = Blockstore::new(Some(blocker.join("sub")), "ATOM", "r").unwrap();
        assert!(bs.store_block(1).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_store_accepts_everything() {
        assert_ok!(EmptyStore.store_block(9).await);
        assert_ok!(EmptyStore.store_signature("sig").await);
    }
}
