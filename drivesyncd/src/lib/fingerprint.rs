use camino::Utf8Path;
use tokio::io::AsyncReadExt;

const CHUNK_SZ: usize = 64 * 1024;

/// Computes the MD5 digest of the file at `path`, as lowercase hex.
/// This is the same representation as Drive's `md5Checksum`.
pub async fn md5_file(path: &Utf8Path) -> drivesync::Result<String> {
    let mut f = tokio::fs::File::open(path)
        .await
        .map_err(|err| drivesync::io_error!("can't open {path}: {err}"))?;
    let mut ctx = md5::Context::new();
    let mut buf = vec![0u8; CHUNK_SZ];
    loop {
        let sz = f.read(&mut buf).await?;
        if sz == 0 {
            break;
        }
        ctx.consume(&buf[..sz]);
    }
    Ok(format!("{:x}", ctx.compute()))
}
