use reqwest::{Client, Request, StatusCode};

use crate::ApiError;

/// Raw outcome of a request: status plus the full body.
pub(crate) struct RawResponse {
    pub status: StatusCode,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub(crate) fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends `request`, logging method, url and status at debug and the body at
/// trace level.
pub(crate) async fn execute(client: &Client, request: Request) -> Result<RawResponse, ApiError> {
    let method = request.method().clone();
    let url = request.url().clone();

    let res = client.execute(request).await?;
    let status = res.status();
    let body = res.bytes().await?.to_vec();

    tracing::debug!(%method, %url, status = status.as_u16(), "http request");
    tracing::trace!(body = %String::from_utf8_lossy(&body), "http response body");

    Ok(RawResponse { status, body })
}
