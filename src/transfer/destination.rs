use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::OpenOptions;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::debug;

use super::error::Result;
use super::models::Completion;

/// 把完成的数据写入本地目录
#[derive(Debug, Clone)]
pub struct FileDestination {
    output_dir: PathBuf,
}

impl FileDestination {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        // 名称来自远端，去掉路径分隔符
        let file_name: String = name
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        let file_name = match file_name.trim() {
            "" | "." | ".." => "download".to_string(),
            trimmed => trimmed.to_string(),
        };
        self.output_dir.join(file_name)
    }

    /// 在 `offset` 处写入数据；从 0 开始写时截断已有文件
    pub async fn write(&self, completion: &Completion) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.output_dir).await?;
        let path = self.path_for(&completion.name);

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(completion.offset == 0)
            .open(&path)
            .await?;

        if completion.offset > 0 {
            file.seek(SeekFrom::Start(completion.offset)).await?;
        }
        file.write_all(&completion.bytes).await?;
        file.flush().await?;

        debug!(
            "写入文件: {}, 起点 {}, {} 字节",
            path.display(),
            completion.offset,
            completion.bytes.len()
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tempfile::TempDir;

    fn completion(name: &str, offset: u64, data: &'static [u8]) -> Completion {
        Completion {
            name: name.to_string(),
            offset,
            bytes: Bytes::from_static(data),
        }
    }

    #[tokio::test]
    async fn test_write_creates_directory_and_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let destination = FileDestination::new(temp_dir.path().join("nested"));

        let path = destination
            .write(&completion("file.bin", 0, b"0123456789"))
            .await
            .expect("write should succeed");

        assert_eq!(path, temp_dir.path().join("nested").join("file.bin"));
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn test_write_at_offset_keeps_prefix() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let destination = FileDestination::new(temp_dir.path());

        destination
            .write(&completion("file.bin", 0, b"0123"))
            .await
            .unwrap();
        let path = destination
            .write(&completion("file.bin", 4, b"456789"))
            .await
            .unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"0123456789");
    }

    #[tokio::test]
    async fn test_write_from_start_truncates() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let destination = FileDestination::new(temp_dir.path());

        destination
            .write(&completion("file.bin", 0, b"a much longer payload"))
            .await
            .unwrap();
        let path = destination
            .write(&completion("file.bin", 0, b"short"))
            .await
            .unwrap();

        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"short");
    }

    #[test]
    fn test_path_for_strips_separators() {
        let destination = FileDestination::new("/tmp/out");
        assert_eq!(
            destination.path_for("../etc/passwd"),
            PathBuf::from("/tmp/out/.._etc_passwd")
        );
        assert_eq!(destination.path_for(".."), PathBuf::from("/tmp/out/download"));
        assert_eq!(destination.path_for(""), PathBuf::from("/tmp/out/download"));
    }
}
