use http::header::{HeaderMap, HeaderName, HeaderValue};
use std::collections::BTreeMap;
use tracing::debug;

/// Header multimap as it travels on the wire: lower-cased name to ordered values.
pub type WireHeaders = BTreeMap<String, Vec<String>>;

/// Flatten a [`HeaderMap`] into wire form, preserving repeated values in order.
///
/// Values that are not visible ASCII are decoded lossily rather than dropped,
/// so a `Set-Cookie` with odd bytes still reaches the other side.
pub fn headers_to_wire(headers: &HeaderMap) -> WireHeaders {
    let mut wire = WireHeaders::new();
    for (name, value) in headers {
        let value = match value.to_str() {
            Ok(v) => v.to_string(),
            Err(_) => String::from_utf8_lossy(value.as_bytes()).into_owned(),
        };
        wire.entry(name.as_str().to_string()).or_default().push(value);
    }
    wire
}

/// Rebuild a [`HeaderMap`] from wire form. Invalid names or values are skipped.
pub fn wire_to_headers(wire: &WireHeaders) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, values) in wire {
        let Ok(header_name) = HeaderName::from_bytes(name.as_bytes()) else {
            debug!(header = %name, "Skipping invalid header name");
            continue;
        };
        for value in values {
            match HeaderValue::from_str(value) {
                Ok(v) => {
                    headers.append(header_name.clone(), v);
                }
                Err(_) => debug!(header = %name, "Skipping invalid header value"),
            }
        }
    }
    headers
}
