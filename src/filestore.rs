use crate::consts::CFS_API_VERSION;
use crate::session::{PlatformSession, SessionError};
use crate::util::{expand_path, filename_from_url};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Client for the file-store catalog.
///
/// Executes the package → file-set → file-URL → download resolution chain
/// against an open [`PlatformSession`].  Holds no mutable state; one
/// instance may serve concurrent runs.
#[derive(Debug)]
pub(crate) struct FileStore<'a> {
    session: &'a PlatformSession,
    http: reqwest::Client,
    version: &'static str,
}

impl<'a> FileStore<'a> {
    pub(crate) fn new(session: &'a PlatformSession) -> FileStore<'a> {
        FileStore {
            session,
            http: session.plain_http().clone(),
            version: CFS_API_VERSION,
        }
    }

    /// List all package ids available under `bucket`, in catalog order.
    ///
    /// `GET /file-store/{version}/packages?bucketName={bucket}`
    pub(crate) async fn list_packages(&self, bucket: &str) -> Result<Vec<String>, ResolveError> {
        if bucket.is_empty() {
            return Err(ResolveError::InvalidArgument { what: "bucket" });
        }
        let path = format!("/file-store/{}/packages", self.version);
        let listing: ValueList<PackageEntry> = self
            .session
            .get_json(&path, &[("bucketName", bucket)], &[])
            .await
            .map_err(|source| ResolveError::Endpoint {
                endpoint: path.clone(),
                source,
            })?;
        Ok(listing.value.into_iter().map(|p| p.package_id).collect())
    }

    /// List the file-sets of a package, in catalog order.
    ///
    /// `GET /file-store/{version}/file-sets?bucket={bucket}&packageId={id}`
    ///
    /// A successful but empty listing is reported as [`ResolveError::Empty`],
    /// distinct from any request failure.
    pub(crate) async fn list_file_sets(
        &self,
        bucket: &str,
        package_id: &str,
    ) -> Result<Vec<FileSetEntry>, ResolveError> {
        if bucket.is_empty() {
            return Err(ResolveError::InvalidArgument { what: "bucket" });
        }
        if package_id.is_empty() {
            return Err(ResolveError::InvalidArgument { what: "package_id" });
        }
        let path = format!("/file-store/{}/file-sets", self.version);
        let listing: ValueList<FileSetEntry> = self
            .session
            .get_json(
                &path,
                &[("bucket", bucket), ("packageId", package_id)],
                &[],
            )
            .await
            .map_err(|source| ResolveError::Endpoint {
                endpoint: path.clone(),
                source,
            })?;
        if listing.value.is_empty() {
            return Err(ResolveError::Empty {
                resource: "file-sets",
            });
        }
        Ok(listing.value)
    }

    /// Resolve the pre-signed download URL for a file id.
    ///
    /// `GET /file-store/{version}/files/{file_id}/stream?doNotRedirect=true`
    pub(crate) async fn resolve_file_location(
        &self,
        file_id: &str,
    ) -> Result<String, ResolveError> {
        if file_id.is_empty() {
            return Err(ResolveError::InvalidArgument { what: "file_id" });
        }
        let path = format!("/file-store/{}/files/{{file_id}}/stream", self.version);
        let params = [("file_id", file_id)];
        let stream: FileStream = self
            .session
            .get_json(&path, &[("doNotRedirect", "true")], &params)
            .await
            .map_err(|source| ResolveError::Endpoint {
                endpoint: expand_path(&path, &params),
                source,
            })?;
        Ok(stream.url)
    }

    /// Fetch the artifact bytes from a pre-signed URL.
    ///
    /// The URL embeds its own authorization, so no bearer token is
    /// attached.  The filename of the returned artifact is derived from the
    /// URL path.
    pub(crate) async fn download(&self, file_url: &str) -> Result<DownloadedArtifact, ResolveError> {
        if file_url.is_empty() {
            return Err(ResolveError::InvalidArgument { what: "file_url" });
        }
        let url = Url::parse(file_url).map_err(|source| ResolveError::BadUrl {
            url: file_url.to_owned(),
            source,
        })?;
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|source| ResolveError::Fetch {
                url: file_url.to_owned(),
                source,
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ResolveError::DownloadFailed {
                url: file_url.to_owned(),
                status,
                body,
            });
        }
        let bytes = resp.bytes().await.map_err(|source| ResolveError::Fetch {
            url: file_url.to_owned(),
            source,
        })?;
        Ok(DownloadedArtifact {
            filename: filename_from_url(file_url),
            bytes: bytes.to_vec(),
        })
    }

    /// Execute the full resolution chain for `bucket` and download the
    /// first file it leads to.
    ///
    /// At every fan-out point the first candidate is taken, matching the
    /// reference workflow; there is no ranking and no retry across
    /// candidates.  Cancelling `cancel` aborts the in-flight request and
    /// fails the run with [`ResolveError::Cancelled`].
    pub(crate) async fn run(
        &self,
        bucket: &str,
        cancel: &CancellationToken,
    ) -> Result<DownloadedArtifact, ResolveError> {
        match cancel.run_until_cancelled(self.resolve_chain(bucket)).await {
            Some(outcome) => outcome,
            None => Err(ResolveError::Cancelled),
        }
    }

    /// Like [`FileStore::run`] for a known package id, entering the chain
    /// at the file-sets stage.
    pub(crate) async fn run_with_package(
        &self,
        bucket: &str,
        package_id: &str,
        cancel: &CancellationToken,
    ) -> Result<DownloadedArtifact, ResolveError> {
        match cancel
            .run_until_cancelled(self.resolve_chain_from_package(bucket, package_id))
            .await
        {
            Some(outcome) => outcome,
            None => Err(ResolveError::Cancelled),
        }
    }

    async fn resolve_chain(&self, bucket: &str) -> Result<DownloadedArtifact, ResolveError> {
        let packages = self.list_packages(bucket).await?;
        let Some(package_id) = packages.first() else {
            return Err(ResolveError::Empty {
                resource: "packages",
            });
        };
        self.resolve_chain_from_package(bucket, package_id).await
    }

    async fn resolve_chain_from_package(
        &self,
        bucket: &str,
        package_id: &str,
    ) -> Result<DownloadedArtifact, ResolveError> {
        let filesets = self.list_file_sets(bucket, package_id).await?;
        let Some(fileset) = filesets.first() else {
            return Err(ResolveError::Empty {
                resource: "file-sets",
            });
        };
        let Some(file_id) = fileset.files.first() else {
            return Err(ResolveError::EmptyFileSet {
                fileset: fileset.id.clone(),
            });
        };
        let location = self.resolve_file_location(file_id).await?;
        self.download(&location).await
    }
}

/// One entry from the packages listing
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
struct PackageEntry {
    package_id: String,
}

/// One entry from the file-sets listing: a group of files produced together
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub(crate) struct FileSetEntry {
    /// Package-scoped file-set identifier
    pub(crate) id: String,

    /// Identifiers of the files in this set, in catalog order
    #[serde(default)]
    pub(crate) files: Vec<String>,
}

/// Common `{"value": [...]}` wrapper on catalog list responses
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
struct ValueList<T> {
    value: Vec<T>,
}

/// Response of the file-stream endpoint when redirects are disabled
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
struct FileStream {
    url: String,
}

/// A downloaded file: raw bytes plus the filename derived from its
/// pre-signed URL
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct DownloadedArtifact {
    pub(crate) filename: String,
    pub(crate) bytes: Vec<u8>,
}

/// Error from a resolution-chain operation
#[derive(Debug, Error)]
pub(crate) enum ResolveError {
    /// An identifier argument was empty; checked before any request is sent
    #[error("received invalid (empty) {what} argument")]
    InvalidArgument { what: &'static str },

    /// A catalog request failed or answered non-2xx
    #[error("failed to request {endpoint}")]
    Endpoint {
        endpoint: String,
        source: SessionError,
    },

    /// The catalog answered successfully but had nothing to offer
    #[error("no {resource} found in catalog")]
    Empty { resource: &'static str },

    /// The selected file-set contains no files
    #[error("file-set {fileset} contains no files")]
    EmptyFileSet { fileset: String },

    /// The pre-signed URL did not parse
    #[error("invalid file URL {url:?}")]
    BadUrl { url: String, source: url::ParseError },

    /// The artifact server answered non-2xx
    #[error("failed to download {url}: HTTP {status}: {body}")]
    DownloadFailed {
        url: String,
        status: StatusCode,
        body: String,
    },

    /// The artifact fetch failed at the transport level
    #[error("failed to fetch {url}")]
    Fetch { url: String, source: reqwest::Error },

    /// The run was cancelled before completion
    #[error("resolution cancelled")]
    Cancelled,
}
