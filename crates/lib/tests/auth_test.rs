//! # Access Token Tests

mod common;

use common::setup_tracing;
use nl2sql::{
    auth::{AdcTokenSource, StaticTokenSource, TokenSource},
    Nl2SqlError,
};
use std::io::Write;
use tempfile::NamedTempFile;

#[tokio::test]
async fn test_static_token_is_returned_as_is() {
    let tokens: Box<dyn TokenSource> = Box::new(StaticTokenSource::new("ya29.test"));
    assert_eq!(tokens.access_token().await.unwrap(), "ya29.test");
    assert!(!format!("{tokens:?}").contains("ya29"));
}

#[tokio::test]
async fn test_invalid_credentials_file_is_an_authentication_error() {
    setup_tracing();
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"this is not a credentials file").unwrap();

    let tokens = AdcTokenSource::from_file(file.path());
    let err = tokens.access_token().await.unwrap_err();

    assert!(matches!(err, Nl2SqlError::Authentication(_)));
    assert!(!err.to_string().contains("could not run"));
}
