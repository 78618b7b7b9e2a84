//! GridFS uploads and downloads.

use futures::TryStreamExt;
use futures::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use log::{info, warn};
use mongodb::bson::{Bson, Document, doc};
use mongodb::gridfs::GridFsUploadStream;

use crate::connection::SessionHandle;
use crate::connection::types::{StoredFile, UploadedFile};
use crate::error::{Error, Result};

impl SessionHandle {
    /// Store `data` as a new file named `file_name` in `store`.
    pub fn upload(&self, store: &str, file_name: &str, data: &[u8]) -> Result<UploadedFile> {
        let uploaded = self.upload_from_reader(store, file_name, data)?;
        debug_assert_eq!(uploaded.bytes_written, data.len());
        Ok(uploaded)
    }

    /// Stream everything `reader` yields into a new file in `store`.
    ///
    /// The file entry only becomes visible once every byte is written and the entry
    /// is closed. If reading or writing fails partway, the chunks written so far are
    /// discarded before the error is returned.
    pub fn upload_from_reader<R>(
        &self,
        store: &str,
        file_name: &str,
        reader: R,
    ) -> Result<UploadedFile>
    where
        R: AsyncRead + Unpin,
    {
        let bucket = self.blob_store(store);

        self.runtime().block_on(async {
            let mut stream = bucket.open_upload_stream(file_name).await.map_err(|source| {
                Error::BlobCreate { store: store.to_string(), file: file_name.to_string(), source }
            })?;
            let id = stream.id().clone();

            let written = match futures::io::copy(reader, &mut stream).await {
                Ok(written) => written,
                Err(source) => {
                    discard(&mut stream, store, file_name).await;
                    return Err(Error::BlobWrite {
                        store: store.to_string(),
                        file: file_name.to_string(),
                        source,
                    });
                }
            };

            if let Err(source) = stream.close().await {
                discard(&mut stream, store, file_name).await;
                return Err(Error::BlobClose {
                    store: store.to_string(),
                    file: file_name.to_string(),
                    source,
                });
            }

            let bytes_written = usize::try_from(written).map_err(|_| {
                Error::InvalidArgument(format!("{file_name} is too large for this platform"))
            })?;
            info!("uploaded {file_name} to {store} as {id} ({bytes_written} bytes)");
            Ok(UploadedFile { id, file_name: file_name.to_string(), bytes_written })
        })
    }

    /// Read a whole file back from `store`
    pub fn download(&self, store: &str, id: Bson) -> Result<Vec<u8>> {
        let bucket = self.blob_store(store);

        self.runtime().block_on(async {
            let mut stream = bucket.open_download_stream(id).await?;
            let mut data = Vec::new();
            stream.read_to_end(&mut data).await?;
            Ok(data)
        })
    }

    /// List completed files in `store`, optionally only those named `file_name`
    pub fn find_files(&self, store: &str, file_name: Option<&str>) -> Result<Vec<StoredFile>> {
        let bucket = self.blob_store(store);
        let filter = match file_name {
            Some(name) => doc! { "filename": name },
            None => Document::new(),
        };

        self.runtime().block_on(async {
            let cursor = bucket.find(filter).await?;
            let files = cursor
                .map_ok(|file| StoredFile {
                    id: file.id,
                    file_name: file.filename,
                    length: file.length,
                })
                .try_collect()
                .await?;
            Ok(files)
        })
    }

    /// Delete a file and its chunks from `store`
    pub fn delete_file(&self, store: &str, id: Bson) -> Result<()> {
        let bucket = self.blob_store(store);
        self.runtime().block_on(async {
            bucket.delete(id).await?;
            Ok(())
        })
    }
}

async fn discard(stream: &mut GridFsUploadStream, store: &str, file_name: &str) {
    if let Err(err) = stream.abort().await {
        warn!("failed to discard partial upload of {file_name} to {store}: {err}");
    }
}
