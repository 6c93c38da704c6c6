//! Turning a `/save` submission into a configuration record

use crate::config::{ConfigRecord, Resolution};
use crate::http::form::{parse_int, FormParams};

/// Join the two halves of the upload URL field
///
/// Both parts are trimmed; one trailing slash is dropped from the base and
/// one leading slash from the endpoint. An empty endpoint leaves the base
/// alone.
pub fn join_upload_url(base: &str, endpoint: &str) -> String {
    let base = base.trim();
    let endpoint = endpoint.trim();

    let base = base.strip_suffix('/').unwrap_or(base);
    let endpoint = endpoint.strip_prefix('/').unwrap_or(endpoint);

    if base.is_empty() || endpoint.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, endpoint)
    }
}

/// Split a stored upload URL back into base and endpoint
///
/// The split happens at the last `/`, but only when that slash comes after
/// the `scheme://` part.
pub fn split_upload_url(url: &str) -> (&str, &str) {
    let authority_start = url.find("://").map(|i| i + 3).unwrap_or(0);

    match url.rfind('/') {
        Some(slash) if slash >= authority_start => (&url[..slash], &url[slash + 1..]),
        _ => (url, ""),
    }
}

fn clamp_i32(value: i64) -> i32 {
    value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Build the record a submission describes
///
/// Every field is taken from the submission; missing fields become empty
/// strings or zero. String fields are clamped to their capacities.
pub fn record_from_params(params: &FormParams) -> ConfigRecord {
    let upload_url = match params.get("upload") {
        Some(url) if !url.trim().is_empty() => url.trim().to_string(),
        _ => join_upload_url(
            params.get_or_empty("upload_base"),
            params.get_or_empty("upload_endpoint"),
        ),
    };

    ConfigRecord {
        ssid: params.get_or_empty("ssid").to_string(),
        password: params.get_or_empty("password").to_string(),
        upload_url,
        resolution: Resolution::from_tag_or_default(params.get_or_empty("res")),
        capture_interval_ms: parse_int(params.get_or_empty("interval"))
            .clamp(0, i64::from(u32::MAX)) as u32,
        vertical_flip: clamp_i32(parse_int(params.get_or_empty("vflip"))),
        brightness: clamp_i32(parse_int(params.get_or_empty("bright"))),
        saturation: clamp_i32(parse_int(params.get_or_empty("sat"))),
    }
    .truncated()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_upload_url() {
        assert_eq!(
            join_upload_url(" http://det.local:5000/ ", "/upload"),
            "http://det.local:5000/upload"
        );
        assert_eq!(join_upload_url("http://det.local", ""), "http://det.local");
        assert_eq!(join_upload_url("", "upload"), "");
        assert_eq!(join_upload_url("http://h//", "x"), "http://h//x");
    }

    #[test]
    fn test_split_upload_url() {
        assert_eq!(
            split_upload_url("http://det.local:5000/upload"),
            ("http://det.local:5000", "upload")
        );
        assert_eq!(
            split_upload_url("https://h/api/v1/upload"),
            ("https://h/api/v1", "upload")
        );
        assert_eq!(split_upload_url("http://det.local"), ("http://det.local", ""));
        assert_eq!(split_upload_url("host/upload"), ("host", "upload"));
        assert_eq!(split_upload_url(""), ("", ""));
    }

    #[test]
    fn test_record_from_params() {
        let params = FormParams::parse(
            "session=x&ssid=My+Net&password=p%40ss&upload_base=http%3A%2F%2Fh%3A5000%2F\
             &upload_endpoint=upload&interval=1500&res=SXGA&vflip=1&bright=-2&sat=3",
        );
        let record = record_from_params(&params);

        assert_eq!(record.ssid, "My Net");
        assert_eq!(record.password, "p@ss");
        assert_eq!(record.upload_url, "http://h:5000/upload");
        assert_eq!(record.capture_interval_ms, 1500);
        assert_eq!(record.resolution, Resolution::Sxga);
        assert_eq!(record.vertical_flip, 1);
        assert_eq!(record.brightness, -2);
        assert_eq!(record.saturation, 3);
    }

    #[test]
    fn test_single_upload_field_wins() {
        let params = FormParams::parse("upload=https%3A%2F%2Fa%2Fb&upload_base=http%3A%2F%2Fz");
        assert_eq!(record_from_params(&params).upload_url, "https://a/b");

        let params = FormParams::parse("upload=&upload_base=http%3A%2F%2Fz");
        assert_eq!(record_from_params(&params).upload_url, "http://z");
    }

    #[test]
    fn test_missing_and_bad_numbers() {
        let params = FormParams::parse("ssid=a&interval=-5&vflip=yes&res=bogus");
        let record = record_from_params(&params);

        assert_eq!(record.capture_interval_ms, 0);
        assert_eq!(record.vertical_flip, 0);
        assert_eq!(record.brightness, 0);
        assert_eq!(record.resolution, Resolution::Vga);
        assert_eq!(record.password, "");
    }

    #[test]
    fn test_long_fields_truncated() {
        let params = FormParams::parse(&format!(
            "ssid={}&password={}",
            "s".repeat(40),
            "p".repeat(80)
        ));
        let record = record_from_params(&params);
        assert_eq!(record.ssid.len(), crate::config::SSID_CAPACITY);
        assert_eq!(record.password.len(), crate::config::PASSWORD_CAPACITY);
    }
}
