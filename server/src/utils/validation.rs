use once_cell::sync::Lazy;
use regex::Regex;

use crate::utils::error::AppError;

static SENEGAL_PHONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+221[0-9]{9}$").expect("valid phone regex"));
static EMAIL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("valid email regex")
});
static HEX_COLOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("valid color regex"));
static SERVICE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z0-9]{1,20}$").expect("valid code regex"));

pub fn phone(value: &str) -> Result<(), AppError> {
    if SENEGAL_PHONE.is_match(value) {
        Ok(())
    } else {
        Err(AppError::validation(
            "Phone number must use the format +221XXXXXXXXX",
        ))
    }
}

/// Lower-cases and checks an email address.
pub fn email(value: &str) -> Result<String, AppError> {
    let normalized = value.trim().to_lowercase();
    if EMAIL.is_match(&normalized) {
        Ok(normalized)
    } else {
        Err(AppError::validation(format!("'{value}' is not a valid email address")))
    }
}

pub fn hex_color(value: &str) -> Result<(), AppError> {
    if HEX_COLOR.is_match(value) {
        Ok(())
    } else {
        Err(AppError::validation("Color must use the format #RRGGBB"))
    }
}

/// Upper-cases a service code and checks it is 1..=20 alphanumerics.
pub fn service_code(value: &str) -> Result<String, AppError> {
    let code = value.trim().to_uppercase();
    if SERVICE_CODE.is_match(&code) {
        Ok(code)
    } else {
        Err(AppError::validation(
            "Service code must be 1 to 20 letters or digits",
        ))
    }
}

pub fn password(value: &str) -> Result<(), AppError> {
    if value.chars().count() < 8 {
        return Err(AppError::validation(
            "Password must contain at least 8 characters",
        ));
    }
    if value.chars().all(|c| c.is_ascii_digit()) {
        return Err(AppError::validation("Password cannot be entirely numeric"));
    }
    Ok(())
}

pub fn not_blank(field: &str, value: &str) -> Result<(), AppError> {
    if value.trim().is_empty() {
        Err(AppError::validation(format!("{field} is required")))
    } else {
        Ok(())
    }
}

pub fn max_len(field: &str, value: &str, max: usize) -> Result<(), AppError> {
    if value.chars().count() > max {
        Err(AppError::validation(format!(
            "{field} must be at most {max} characters"
        )))
    } else {
        Ok(())
    }
}

pub fn in_range<T>(field: &str, value: T, min: T, max: T) -> Result<(), AppError>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min || value > max {
        Err(AppError::validation(format!(
            "{field} must be between {min} and {max}"
        )))
    } else {
        Ok(())
    }
}

/// Latitude and longitude must be given together and lie on the globe.
pub fn coordinates(latitude: Option<f64>, longitude: Option<f64>) -> Result<(), AppError> {
    match (latitude, longitude) {
        (None, None) => Ok(()),
        (Some(lat), Some(lon)) => {
            in_range("latitude", lat, -90.0, 90.0)?;
            in_range("longitude", lon, -180.0, 180.0)
        }
        _ => Err(AppError::validation(
            "latitude and longitude must be provided together",
        )),
    }
}
