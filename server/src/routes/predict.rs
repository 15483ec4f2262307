//! Prediction endpoint
//!
//! POST /predict accepts a multipart upload and answers with the predicted
//! brand. Client mistakes (no file, malformed body, undecodable image) map to
//! 400; anything else maps to 500. Both carry `{"error": "..."}`.

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use car_brand_classifier::ClassifierError;

use crate::state::SharedState;

/// Name of the multipart field that carries the image
pub const UPLOAD_FIELD: &str = "file";

#[derive(Debug, Serialize, Deserialize)]
pub struct PredictResponse {
    pub predicted_class: String,
    /// Percentage in [0, 100]
    pub confidence: f32,
}

/// Error converted into a JSON response at the request boundary
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    /// Body read failures keep axum's status (400, or 413 above the upload limit)
    fn upload(context: &str, err: MultipartError) -> Self {
        let status = err.status();
        let status = if status.is_client_error() {
            status
        } else {
            StatusCode::BAD_REQUEST
        };
        Self {
            status,
            message: format!("{}: {}", context, err.body_text()),
        }
    }
}

impl From<ClassifierError> for ApiError {
    fn from(err: ClassifierError) -> Self {
        if err.is_client_error() {
            Self::bad_request(err.to_string())
        } else {
            Self::internal(err.to_string())
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("Prediction failed: {}", self.message);
        } else {
            warn!("Rejected prediction request: {}", self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// POST /predict - Classify an uploaded image
pub async fn predict(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::bad_request(e.body_text()))?;

    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::upload("Malformed multipart body", e))?
    {
        if field.name() == Some(UPLOAD_FIELD) || field.file_name().is_some() {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::upload("Failed to read upload", e))?;
            upload = Some(bytes);
            break;
        }
    }

    let bytes = upload.ok_or_else(|| {
        ApiError::bad_request(format!("No file uploaded (expected field '{}')", UPLOAD_FIELD))
    })?;

    let prediction = tokio::task::spawn_blocking(move || state.predict_bytes(&bytes))
        .await
        .map_err(|e| ApiError::internal(format!("Prediction task failed: {}", e)))??;

    info!(
        "Predicted {} ({:.2}%) in {:.1}ms",
        prediction.predicted_class, prediction.confidence, prediction.inference_time_ms
    );

    Ok(Json(PredictResponse {
        predicted_class: prediction.predicted_class,
        confidence: prediction.confidence,
    }))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use axum::Router;
    use tower::ServiceExt;

    use super::*;
    use crate::routes::build_router;
    use crate::state::test_support::bmw_predictor;
    use crate::state::{AppState, ServerConfig};

    const BOUNDARY: &str = "carbrandtestboundary";

    /// Router whose model always answers "bmw" with full confidence
    fn test_app() -> Router {
        app_with_config(ServerConfig {
            image_size: 32,
            ..Default::default()
        })
    }

    fn app_with_config(config: ServerConfig) -> Router {
        let predictor = bmw_predictor(config.image_size);
        build_router(Arc::new(AppState::new(config, predictor)))
    }

    /// A PNG of pseudo-random pixels, which barely compresses
    fn noise_png(side: u32) -> Vec<u8> {
        let mut seed: u32 = 0x9e37_79b9;
        let image = image::RgbImage::from_fn(side, side, |_, _| {
            let mut channel = || {
                seed ^= seed << 13;
                seed ^= seed >> 17;
                seed ^= seed << 5;
                (seed & 0xff) as u8
            };
            image::Rgb([channel(), channel(), channel()])
        });
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(image)
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn png_bytes() -> Vec<u8> {
        let image = image::DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
            48,
            24,
            image::Rgb([30, 60, 200]),
        ));
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn multipart_body(field: &str, filename: Option<&str>, content: &[u8]) -> Vec<u8> {
        let disposition = match filename {
            Some(name) => format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                field, name
            ),
            None => format!("Content-Disposition: form-data; name=\"{}\"\r\n", field),
        };

        let mut body = Vec::new();
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(disposition.as_bytes());
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(content);
        body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
        body
    }

    fn predict_request(body: Vec<u8>) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/predict")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_predict_returns_favored_class() {
        let body = multipart_body("file", Some("car.png"), &png_bytes());
        let response = test_app().oneshot(predict_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["predicted_class"], "bmw");
        assert_eq!(json["confidence"].as_f64().unwrap(), 100.0);
    }

    #[tokio::test]
    async fn test_photo_larger_than_two_megabytes_is_classified() {
        let png = noise_png(1000);
        assert!(png.len() > 2 * 1024 * 1024);

        let body = multipart_body("file", Some("photo.png"), &png);
        let response = test_app().oneshot(predict_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["predicted_class"], "bmw");
    }

    #[tokio::test]
    async fn test_upload_above_configured_limit_is_413() {
        let app = app_with_config(ServerConfig {
            image_size: 32,
            max_upload_bytes: 64 * 1024,
            ..Default::default()
        });

        let body = multipart_body("file", Some("photo.png"), &noise_png(300));
        let response = app.oneshot(predict_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_non_image_upload_is_400() {
        let body = multipart_body("file", Some("notes.txt"), b"definitely not an image");
        let response = test_app().oneshot(predict_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert_eq!(json["error"], "Invalid or corrupted image file.");
    }

    #[tokio::test]
    async fn test_empty_upload_is_400() {
        let body = multipart_body("file", Some("empty.jpg"), b"");
        let response = test_app().oneshot(predict_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_missing_file_field_is_400() {
        let body = multipart_body("comment", None, b"hello");
        let response = test_app().oneshot(predict_request(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json = json_body(response).await;
        assert!(json["error"].as_str().unwrap().contains("No file uploaded"));
    }

    #[tokio::test]
    async fn test_non_multipart_request_is_400() {
        let request = Request::builder()
            .method("POST")
            .uri("/predict")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{}"))
            .unwrap();
        let response = test_app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(json_body(response).await["error"].is_string());
    }

    #[tokio::test]
    async fn test_cors_allows_any_origin() {
        let body = multipart_body("file", Some("car.png"), &png_bytes());
        let mut request = predict_request(body);
        request
            .headers_mut()
            .insert(header::ORIGIN, "http://example.com".parse().unwrap());

        let response = test_app().oneshot(request).await.unwrap();
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
                .unwrap(),
            "*"
        );
    }

    #[tokio::test]
    async fn test_health_lists_classes() {
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = test_app().oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = json_body(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["classes"], serde_json::json!(["audi", "bmw", "toyota"]));
    }

    #[test]
    fn test_error_status_mapping() {
        let err: ApiError = ClassifierError::InvalidImage("bad".to_string()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err: ApiError = ClassifierError::Unexpected("boom".to_string()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);

        let err: ApiError = ClassifierError::Tensor("shape".to_string()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
