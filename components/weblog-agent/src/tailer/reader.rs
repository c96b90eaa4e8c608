// Local crates
use crate::tailer::models::TailError;

// External crates
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt, SeekFrom};

const READ_BUFFER_SIZE: u64 = 4096;

/// Last non-empty line of `path`, read backwards from the end in chunks so
/// large logs are not scanned from the start.
pub async fn read_last_line(path: &Path) -> Result<String, TailError> {
    let open_err = |source| TailError::Open {
        path: path.to_path_buf(),
        source,
    };

    let mut file = File::open(path).await.map_err(open_err)?;
    let mut end = file.metadata().await.map_err(open_err)?.len();

    // Bytes from `end` to the original end of file.
    let mut tail: Vec<u8> = Vec::new();

    loop {
        let content_end = tail.iter().rposition(|b| !matches!(b, b'\n' | b'\r'));

        if let Some(last) = content_end {
            if let Some(newline) = tail[..last].iter().rposition(|&b| b == b'\n') {
                return Ok(String::from_utf8_lossy(&tail[newline + 1..=last]).into_owned());
            }
            if end == 0 {
                return Ok(String::from_utf8_lossy(&tail[..=last]).into_owned());
            }
        } else if end == 0 {
            return Err(TailError::EmptyFile {
                path: path.to_path_buf(),
            });
        }

        let start = end.saturating_sub(READ_BUFFER_SIZE);
        let mut chunk = vec![0u8; (end - start) as usize];
        file.seek(SeekFrom::Start(start)).await?;
        file.read_exact(&mut chunk).await?;

        chunk.extend_from_slice(&tail);
        tail = chunk;
        end = start;
    }
}
