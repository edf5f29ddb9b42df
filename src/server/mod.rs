// src/server/mod.rs

//! Versioned HTTP API
//!
//! Every route resolves its own [`Locator`] and system from the request, so
//! concurrent requests never share address state. Engine calls block on
//! external tools and file locks and therefore run on the blocking pool.

mod response;

pub use response::{ApiResponse, status_for};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::locator::{Locator, System};
use crate::repository::{self, AddedPackage, RepositoryFacade};
use axum::body::Body;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Query, Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Router};
use serde::Deserialize;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio_util::io::ReaderStream;
use tracing::{error, info};

/// Multipart field carrying the uploaded package
pub const UPLOAD_FIELD: &str = "package_file";

type Shared = State<Arc<Config>>;

/// Query parameters accepted by every route. Edits also read them from an
/// urlencoded body.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RequestParams {
    pub system: Option<String>,
    pub force: bool,
    pub new_epoch: Option<String>,
    pub target: Option<String>,
}

impl RequestParams {
    fn system(&self) -> Result<Option<System>> {
        self.system.as_deref().map(str::parse).transpose()
    }

    /// Fill in what the query string left unset
    fn merge(&mut self, form: RequestParams) {
        self.system = self.system.take().or(form.system);
        self.force |= form.force;
        self.new_epoch = self.new_epoch.take().or(form.new_epoch);
        self.target = self.target.take().or(form.target);
    }
}

#[derive(Debug, Deserialize)]
struct PartialPath {
    repo: Option<String>,
    epoch: Option<String>,
    db: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RepositoryPath {
    repo: String,
    epoch: String,
    db: String,
    arch: String,
}

impl RepositoryPath {
    fn address(&self) -> String {
        format!("{}/{}/{}/{}", self.repo, self.epoch, self.db, self.arch)
    }
}

#[derive(Debug, Deserialize)]
struct PackagePath {
    repo: String,
    epoch: String,
    db: String,
    arch: String,
    package: String,
}

impl PackagePath {
    fn address(&self) -> String {
        format!("{}/{}/{}/{}", self.repo, self.epoch, self.db, self.arch)
    }
}

/// Build the API router
pub fn router(config: Arc<Config>) -> Router {
    let body_limit = config.max_upload_bytes;

    Router::new()
        .route("/v1", get(list_repositories))
        .route("/v1/", get(list_repositories))
        .route("/v1/:repo", get(list_address))
        .route("/v1/:repo/:epoch", get(list_address))
        .route("/v1/:repo/:epoch/:db", get(list_address))
        .route(
            "/v1/:repo/:epoch/:db/:arch",
            get(list_packages).post(add_package).put(replace_package),
        )
        .route(
            "/v1/:repo/:epoch/:db/:arch/:package",
            get(describe_package)
                .delete(remove_package)
                .patch(edit_package)
                .post(edit_package),
        )
        .route("/v1/:repo/:epoch/:db/:arch/:package/file", get(fetch_file))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(log_request))
        .with_state(config)
}

/// Serve the API until ctrl-c
pub async fn serve(config: Arc<Config>, address: &str) -> Result<()> {
    let listener = TcpListener::bind(address).await?;
    info!(
        "Serving repositories under {} on {}",
        config.root.display(),
        listener.local_addr()?
    );

    axum::serve(listener, router(config))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
}

async fn log_request(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let started = Instant::now();

    let response = next.run(request).await;

    info!(
        "{} {} {} {:?}",
        method,
        uri,
        response.status().as_u16(),
        started.elapsed()
    );
    response
}

/// Run an engine call on the blocking pool
async fn blocking<T, F>(call: F) -> std::result::Result<T, ApiResponse>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    match tokio::task::spawn_blocking(call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(ApiResponse::from_error(&e)),
        Err(e) => {
            error!("Engine task failed: {}", e);
            Err(ApiResponse::failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal error",
            ))
        }
    }
}

fn open_facade(
    config: &Arc<Config>,
    address: &str,
    params: &RequestParams,
) -> Result<RepositoryFacade> {
    let locator = Locator::new(config.root.clone(), address)?;
    RepositoryFacade::open(Arc::clone(config), locator, params.system()?)
}

fn added_response(added: AddedPackage) -> ApiResponse {
    let file = added
        .path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    ApiResponse::ok()
        .with("package", vec![added.name])
        .with("version", vec![added.version])
        .with("file", vec![file])
        .with("sha256", vec![added.sha256])
}

/// Read the upload field, returning its file name and content
async fn read_upload(
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> std::result::Result<(String, Vec<u8>), ApiResponse> {
    let bad_request = |message: String| ApiResponse::failure(StatusCode::BAD_REQUEST, message);

    let mut multipart = multipart.map_err(|e| bad_request(e.to_string()))?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| bad_request(e.to_string()))?
    {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let file_name = field
            .file_name()
            .map(ToString::to_string)
            .ok_or_else(|| bad_request(format!("field '{}' has no file name", UPLOAD_FIELD)))?;
        let content = field
            .bytes()
            .await
            .map_err(|e| bad_request(e.to_string()))?;
        return Ok((file_name, content.to_vec()));
    }

    Err(bad_request(format!(
        "missing multipart field '{}'",
        UPLOAD_FIELD
    )))
}

async fn list_repositories(State(config): Shared) -> ApiResponse {
    match blocking(move || repository::list_repositories(&config.root)).await {
        Ok(names) => ApiResponse::ok().with("repositories", names),
        Err(response) => response,
    }
}

async fn list_address(
    State(config): Shared,
    Path(path): Path<PartialPath>,
    Query(params): Query<RequestParams>,
) -> ApiResponse {
    let address = [path.repo, path.epoch, path.db]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("/");

    let result = blocking(move || {
        let locator = Locator::new(config.root.clone(), &address)?;
        let system = params.system()?;
        repository::list_address(config, locator, system)
    })
    .await;

    match result {
        Ok(listing) => ApiResponse::ok().with(listing.kind, listing.names),
        Err(response) => response,
    }
}

async fn list_packages(
    State(config): Shared,
    Path(path): Path<RepositoryPath>,
    Query(params): Query<RequestParams>,
) -> ApiResponse {
    let result =
        blocking(move || open_facade(&config, &path.address(), &params)?.list_packages()).await;

    match result {
        Ok(names) => ApiResponse::ok().with("packages", names),
        Err(response) => response,
    }
}

async fn upload(
    config: Arc<Config>,
    path: RepositoryPath,
    params: RequestParams,
    force: bool,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> ApiResponse {
    let (file_name, content) = match read_upload(multipart).await {
        Ok(upload) => upload,
        Err(response) => return response,
    };

    let result = blocking(move || {
        open_facade(&config, &path.address(), &params)?.add_package(
            &file_name,
            &mut Cursor::new(content),
            force,
        )
    })
    .await;

    match result {
        Ok(added) => added_response(added),
        Err(response) => response,
    }
}

async fn add_package(
    State(config): Shared,
    Path(path): Path<RepositoryPath>,
    Query(params): Query<RequestParams>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> ApiResponse {
    let force = params.force;
    upload(config, path, params, force, multipart).await
}

async fn replace_package(
    State(config): Shared,
    Path(path): Path<RepositoryPath>,
    Query(params): Query<RequestParams>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> ApiResponse {
    upload(config, path, params, true, multipart).await
}

async fn describe_package(
    State(config): Shared,
    Path(path): Path<PackagePath>,
    Query(params): Query<RequestParams>,
) -> ApiResponse {
    let result = blocking(move || {
        open_facade(&config, &path.address(), &params)?.describe_package(&path.package)
    })
    .await;

    match result {
        Ok(record) => ApiResponse::ok().with("package", vec![record]),
        Err(response) => response,
    }
}

async fn remove_package(
    State(config): Shared,
    Path(path): Path<PackagePath>,
    Query(params): Query<RequestParams>,
) -> ApiResponse {
    let result = blocking(move || {
        open_facade(&config, &path.address(), &params)?.remove_package(&path.package)
    })
    .await;

    match result {
        Ok(removed) => ApiResponse::ok().with("package", vec![removed.name]).with(
            "removed",
            removed
                .files
                .iter()
                .filter_map(|file| file.file_name())
                .map(|name| name.to_string_lossy().into_owned())
                .collect(),
        ),
        Err(response) => response,
    }
}

fn is_form(request: &Request) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"))
}

/// Copy with `new_epoch` or `target`, otherwise replace from the upload
async fn edit_package(
    State(config): Shared,
    Path(path): Path<PackagePath>,
    Query(mut params): Query<RequestParams>,
    request: Request,
) -> ApiResponse {
    if is_form(&request) {
        match Form::<RequestParams>::from_request(request, &()).await {
            Ok(Form(form)) => params.merge(form),
            Err(rejection) => {
                return ApiResponse::failure(StatusCode::BAD_REQUEST, rejection.to_string());
            }
        }
    } else if params.new_epoch.is_none() && params.target.is_none() {
        let multipart = Multipart::from_request(request, &()).await;
        let (file_name, content) = match read_upload(multipart).await {
            Ok(upload) => upload,
            Err(response) => return response,
        };
        let result = blocking(move || {
            open_facade(&config, &path.address(), &params)?.edit_package(
                &path.package,
                &file_name,
                &mut Cursor::new(content),
            )
        })
        .await;

        return match result {
            Ok(added) => added_response(added),
            Err(response) => response,
        };
    }

    let result = blocking(move || {
        let facade = open_facade(&config, &path.address(), &params)?;
        match (&params.new_epoch, &params.target) {
            (Some(epoch), _) => facade.change_epoch(&path.package, epoch, params.force),
            (None, Some(target)) => {
                let target = facade.locator().retarget(target)?;
                facade.copy_package(&path.package, target, params.force)
            }
            (None, None) => Err(Error::InvalidAddress {
                address: path.address(),
                reason: "no copy destination given".to_string(),
            }),
        }
    })
    .await;

    match result {
        Ok(added) => added_response(added),
        Err(response) => response,
    }
}

async fn fetch_file(
    State(config): Shared,
    Path(path): Path<PackagePath>,
    Query(params): Query<RequestParams>,
) -> Response {
    let file = match blocking(move || {
        open_facade(&config, &path.address(), &params)?.fetch_file(&path.package)
    })
    .await
    {
        Ok(file) => file,
        Err(response) => return response.into_response(),
    };

    let (handle, length) = match open_download(&file).await {
        Ok(opened) => opened,
        Err(e) => return ApiResponse::from_error(&e).into_response(),
    };
    let file_name = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    (
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_LENGTH, length.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        Body::from_stream(ReaderStream::new(handle)),
    )
        .into_response()
}

async fn open_download(file: &std::path::Path) -> Result<(tokio::fs::File, u64)> {
    let handle = tokio::fs::File::open(file)
        .await
        .map_err(Error::io_at(file))?;
    let length = handle.metadata().await.map_err(Error::io_at(file))?.len();
    Ok((handle, length))
}
