use crate::utils::error::{EtlError, Result};
use std::collections::HashSet;
use std::path::Path;
use url::Url;

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

fn invalid(field_name: &str, value: impl ToString, reason: impl Into<String>) -> EtlError {
    EtlError::InvalidConfigValueError {
        field: field_name.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

pub fn validate_url(field_name: &str, url_str: &str) -> Result<()> {
    if url_str.is_empty() {
        return Err(invalid(field_name, url_str, "URL cannot be empty"));
    }

    match Url::parse(url_str) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok(()),
            scheme => Err(invalid(
                field_name,
                url_str,
                format!("Unsupported URL scheme: {}", scheme),
            )),
        },
        Err(e) => Err(invalid(field_name, url_str, format!("Invalid URL format: {}", e))),
    }
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(invalid(field_name, path, "Path cannot be empty"));
    }
    if path.contains('\0') {
        return Err(invalid(field_name, path, "Path contains null bytes"));
    }
    Ok(())
}

pub fn validate_positive_number(field_name: &str, value: usize, min_value: usize) -> Result<()> {
    if value < min_value {
        return Err(invalid(
            field_name,
            value,
            format!("Value must be at least {}", min_value),
        ));
    }
    Ok(())
}

/// Input dumps come as `.csv`, `.tsv`, `.tab` or `.txt`; anything else is
/// almost always a wrong path in the config.
pub fn validate_file_extension(field_name: &str, file: &str, allowed_extensions: &[&str]) -> Result<()> {
    let allowed_set: HashSet<&str> = allowed_extensions.iter().copied().collect();

    match Path::new(file).extension().and_then(|ext| ext.to_str()) {
        Some(extension) if allowed_set.contains(extension) => Ok(()),
        Some(extension) => Err(invalid(
            field_name,
            file,
            format!(
                "Unsupported file extension: {}. Allowed extensions: {}",
                extension,
                allowed_extensions.join(", ")
            ),
        )),
        None => Err(invalid(
            field_name,
            file,
            "File has no extension or invalid filename",
        )),
    }
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(invalid(
            field_name,
            value,
            "Value cannot be empty or whitespace-only",
        ));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(invalid(
            field_name,
            value,
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_url() {
        assert!(validate_url("images.endpoint", "https://api.inaturalist.org/v2").is_ok());
        assert!(validate_url("images.endpoint", "http://127.0.0.1:8080").is_ok());
        assert!(validate_url("images.endpoint", "").is_err());
        assert!(validate_url("images.endpoint", "api.inaturalist.org").is_err());
        assert!(validate_url("images.endpoint", "ftp://api.inaturalist.org").is_err());
    }

    #[test]
    fn test_validate_file_extension() {
        let allowed = ["csv", "tsv", "tab"];
        assert!(validate_file_extension("taxonomy.taxon_file", "taxon.tab", &allowed).is_ok());
        assert!(validate_file_extension("countries.file", "GBIF_output.csv", &allowed).is_ok());
        assert!(validate_file_extension("traits.traits_file", "traits.json", &allowed).is_err());
        assert!(validate_file_extension("traits.terms_file", "terms", &allowed).is_err());
    }

    #[test]
    fn test_validate_range_and_positive() {
        assert!(validate_range("images.batch_size", 30, 1, 200).is_ok());
        assert!(validate_range("images.batch_size", 0, 1, 200).is_err());
        assert!(validate_positive_number("countries.rare_threshold", 0, 1).is_err());
        assert!(validate_non_empty_string("deck.notetype", "  ").is_err());
    }
}
