//! Pure mapping from enriched records to the destination schema.
//!
//! Every coercion here is total: missing or malformed fields fall back to
//! defaults instead of failing, so a single odd record never blocks a batch.
//! The vehicle-descriptor split is a best-effort heuristic over free text and
//! can misassign tokens on unusual inputs; it is kept isolated here for that
//! reason.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::domain::record::{truthy, EnrichedPart};
use crate::infrastructure::config::DeliveryConfig;

/// Fixed destination classification for spare parts.
const VEHICLE_TYPE: u32 = 4;

/// One record in the shape the destination batch endpoint accepts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DestinationPart {
    #[serde(rename = "warehouseID", skip_serializing_if = "Option::is_none")]
    pub warehouse_id: Option<i64>,
    pub external_platform_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub part_description: Option<String>,
    pub price: f64,
    pub quantity: i64,
    pub is_active: bool,
    pub vehicle_type: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub submodel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub motor_code: Option<String>,
    pub images: Vec<String>,
}

/// Best-effort split of a free-text vehicle descriptor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VehicleDescriptor {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub version: Option<String>,
    pub submodel: Option<String>,
    pub motor_code: Option<String>,
}

/// Map one enriched record to the destination schema.
pub fn map_part(part: &EnrichedPart, config: &DeliveryConfig) -> DestinationPart {
    let extra = &part.record.extra;
    let vehicle = extra
        .get("vehicle")
        .and_then(Value::as_str)
        .map(parse_vehicle_descriptor)
        .unwrap_or_default();

    let warehouse_id = coerce_i64_opt(extra.get("warehouseID"))
        .or_else(|| part.record.part_id.as_deref().and_then(|id| id.parse().ok()));

    let images = part
        .images
        .iter()
        .filter_map(|image| image.location_ref.as_deref())
        .filter_map(|reference| resolve_image_url(reference, config.image_base_url.as_deref()))
        .collect();

    DestinationPart {
        warehouse_id,
        external_platform_name: config.platform_name.clone(),
        part_description: extra
            .get("partDescription")
            .or_else(|| extra.get("description"))
            .and_then(Value::as_str)
            .map(str::to_string),
        price: coerce_f64_opt(extra.get("price")).unwrap_or(0.0),
        quantity: coerce_i64_opt(extra.get("quantity")).unwrap_or(0),
        is_active: extra.get("isActive").map(truthy).unwrap_or(false),
        vehicle_type: VEHICLE_TYPE,
        brand: vehicle.brand,
        model: vehicle.model,
        version: vehicle.version,
        submodel: vehicle.submodel,
        motor_code: vehicle.motor_code,
        images,
    }
}

/// Split a descriptor like `"FORD FOCUS 1.8 TDCI KKDA"` by token position:
/// first token is the brand, a trailing all-caps alphanumeric token is the
/// motor code, the first digit-bearing token is the version, tokens before it
/// form the model and tokens after it the submodel.
pub fn parse_vehicle_descriptor(text: &str) -> VehicleDescriptor {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    let mut descriptor = VehicleDescriptor::default();

    if tokens.len() > 1 && tokens.last().is_some_and(|t| is_motor_code(t)) {
        descriptor.motor_code = tokens.pop().map(str::to_string);
    }

    let Some((brand, rest)) = tokens.split_first() else {
        return descriptor;
    };
    descriptor.brand = Some((*brand).to_string());

    match rest.iter().position(|t| t.chars().any(|c| c.is_ascii_digit())) {
        Some(index) => {
            if index > 0 {
                descriptor.model = Some(rest[..index].join(" "));
            }
            descriptor.version = Some(rest[index].to_string());
            if index + 1 < rest.len() {
                descriptor.submodel = Some(rest[index + 1..].join(" "));
            }
        }
        None => {
            if !rest.is_empty() {
                descriptor.model = Some(rest.join(" "));
            }
        }
    }
    descriptor
}

fn is_motor_code(token: &str) -> bool {
    token.len() >= 2
        && token.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        && token.chars().any(|c| c.is_ascii_uppercase())
}

/// Resolve an image reference to an absolute URL, or drop it. Relative
/// references are only kept when a base URL is configured.
pub fn resolve_image_url(reference: &str, base: Option<&str>) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }
    if let Ok(url) = Url::parse(reference) {
        if matches!(url.scheme(), "http" | "https") {
            return Some(url.to_string());
        }
        return None;
    }
    let base = Url::parse(base?).ok()?;
    base.join(reference).ok().map(|url| url.to_string())
}

fn coerce_f64_opt(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn coerce_i64_opt(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().map(|f| f as i64))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::{PartImage, PartRecord};
    use rstest::rstest;
    use serde_json::json;

    fn descriptor(
        brand: Option<&str>,
        model: Option<&str>,
        version: Option<&str>,
        submodel: Option<&str>,
        motor_code: Option<&str>,
    ) -> VehicleDescriptor {
        VehicleDescriptor {
            brand: brand.map(str::to_string),
            model: model.map(str::to_string),
            version: version.map(str::to_string),
            submodel: submodel.map(str::to_string),
            motor_code: motor_code.map(str::to_string),
        }
    }

    #[rstest]
    #[case("FORD FOCUS 1.8 TDCI KKDA",
        descriptor(Some("FORD"), Some("FOCUS"), Some("1.8"), Some("TDCI"), Some("KKDA")))]
    #[case("RENAULT CLIO II 1.5",
        descriptor(Some("RENAULT"), Some("CLIO II"), Some("1.5"), None, None))]
    #[case("SEAT IBIZA",
        descriptor(Some("SEAT"), Some("IBIZA"), None, None, None))]
    #[case("FORD", descriptor(Some("FORD"), None, None, None, None))]
    #[case("", descriptor(None, None, None, None, None))]
    #[case("OPEL CORSA D 1.3 CDTI Z13DTJ",
        descriptor(Some("OPEL"), Some("CORSA D"), Some("1.3"), Some("CDTI"), Some("Z13DTJ")))]
    fn vehicle_descriptor_cases(#[case] input: &str, #[case] expected: VehicleDescriptor) {
        assert_eq!(parse_vehicle_descriptor(input), expected);
    }

    #[rstest]
    #[case("https://cdn.example.com/a.jpg", None, Some("https://cdn.example.com/a.jpg"))]
    #[case("a.jpg", Some("https://cdn.example.com/parts/"), Some("https://cdn.example.com/parts/a.jpg"))]
    #[case("a.jpg", None, None)]
    #[case("ftp://cdn.example.com/a.jpg", None, None)]
    #[case("  ", Some("https://cdn.example.com/"), None)]
    fn image_url_cases(
        #[case] reference: &str,
        #[case] base: Option<&str>,
        #[case] expected: Option<&str>,
    ) {
        assert_eq!(resolve_image_url(reference, base), expected.map(str::to_string));
    }

    fn enriched(extra: serde_json::Value, images: Vec<PartImage>) -> EnrichedPart {
        let record: PartRecord = serde_json::from_value(extra).unwrap();
        EnrichedPart::new(record, images)
    }

    #[test]
    fn maps_full_record() {
        let config = DeliveryConfig {
            platform_name: "parts-sync".into(),
            image_base_url: Some("https://cdn.example.com/".into()),
            ..DeliveryConfig::default()
        };
        let part = enriched(
            json!({
                "partId": "123",
                "warehouseID": 456,
                "description": "Alternator",
                "price": "89.90",
                "quantity": "3",
                "isActive": "1",
                "vehicle": "FORD FOCUS 1.8 TDCI KKDA"
            }),
            vec![PartImage {
                location_ref: Some("img/1.jpg".into()),
                is_primary: true,
                filename: None,
                extension: None,
                last_modified: None,
            }],
        );

        let mapped = map_part(&part, &config);
        assert_eq!(mapped.warehouse_id, Some(456));
        assert_eq!(mapped.part_description.as_deref(), Some("Alternator"));
        assert!((mapped.price - 89.90).abs() < f64::EPSILON);
        assert_eq!(mapped.quantity, 3);
        assert!(mapped.is_active);
        assert_eq!(mapped.vehicle_type, 4);
        assert_eq!(mapped.brand.as_deref(), Some("FORD"));
        assert_eq!(mapped.motor_code.as_deref(), Some("KKDA"));
        assert_eq!(mapped.images, vec!["https://cdn.example.com/img/1.jpg"]);
    }

    #[test]
    fn invalid_numerics_default_to_zero() {
        let config = DeliveryConfig::default();
        let part = enriched(
            json!({"partId": "9", "price": "n/a", "quantity": null}),
            Vec::new(),
        );
        let mapped = map_part(&part, &config);
        assert_eq!(mapped.price, 0.0);
        assert_eq!(mapped.quantity, 0);
        assert!(!mapped.is_active);
        // Falls back to the numeric record identifier.
        assert_eq!(mapped.warehouse_id, Some(9));
    }

    #[test]
    fn relative_images_are_dropped_without_a_base() {
        let config = DeliveryConfig { image_base_url: None, ..DeliveryConfig::default() };
        let part = enriched(
            json!({"partId": "1"}),
            vec![
                PartImage {
                    location_ref: Some("relative.jpg".into()),
                    is_primary: false,
                    filename: None,
                    extension: None,
                    last_modified: None,
                },
                PartImage {
                    location_ref: Some("https://cdn.example.com/kept.jpg".into()),
                    is_primary: false,
                    filename: None,
                    extension: None,
                    last_modified: None,
                },
            ],
        );
        let mapped = map_part(&part, &config);
        assert_eq!(mapped.images, vec!["https://cdn.example.com/kept.jpg"]);
    }

    #[test]
    fn wire_names_match_destination_contract() {
        let config = DeliveryConfig::default();
        let part = enriched(json!({"partId": "7", "isActive": true}), Vec::new());
        let value = serde_json::to_value(map_part(&part, &config)).unwrap();
        assert!(value.get("warehouseID").is_some());
        assert!(value.get("externalPlatformName").is_some());
        assert!(value.get("isActive").is_some());
        assert!(value.get("vehicleType").is_some());
        assert!(value.get("warehouse_id").is_none());
    }
}
