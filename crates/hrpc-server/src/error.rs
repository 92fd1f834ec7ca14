//! Maps an [`hrpc_core::HrpcError`] to a wire response: status code from
//! the error kind, body is a single serialized exception under
//! `application/x-wf-jbmar-exception`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hrpc_core::content_type;
use tracing::error;

pub struct ServerError(pub hrpc_core::HrpcError);

impl From<hrpc_core::HrpcError> for ServerError {
    fn from(err: hrpc_core::HrpcError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        error!(error = %self.0, kind = ?self.0.kind(), "request failed");

        let status = self.0.kind().status_code().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut body = bytes::BytesMut::new();
        hrpc_codec::encode_exception(&mut body, self.0.kind(), &self.0.msg);

        (status, [(axum::http::header::CONTENT_TYPE, content_type::EXCEPTION.to_string())], body.freeze()).into_response()
    }
}
