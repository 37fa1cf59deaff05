//! Offline city-name geocoder.
//!
//! An embedded table maps normalized city names (Russian and Latin
//! spellings, region aliases) to coordinates. No network calls.

use once_cell::sync::Lazy;
use std::collections::HashMap;

pub const GEO_KNOWN: &str = "known";
pub const GEO_UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

static CITY_TABLE: Lazy<HashMap<&'static str, GeoPoint>> = Lazy::new(|| {
    let entries: &[(&str, f64, f64)] = &[
        // Major cities
        ("алматы", 43.2220, 76.8512),
        ("астана", 51.1694, 71.4491),
        ("нур-султан", 51.1694, 71.4491),
        ("nur-sultan", 51.1694, 71.4491),
        ("шымкент", 42.3417, 69.5901),
        ("shymkent", 42.3417, 69.5901),
        ("chimkent", 42.3417, 69.5901),
        ("чимкент", 42.3417, 69.5901),
        ("караганда", 49.8047, 73.1094),
        ("актобе", 50.2839, 57.1670),
        ("актюбинск", 50.2839, 57.1670),
        ("aktobe", 50.2839, 57.1670),
        ("aktyubinsk", 50.2839, 57.1670),
        ("тараз", 42.9000, 71.3667),
        ("taraz", 42.9000, 71.3667),
        ("джамбул", 42.9000, 71.3667),
        ("dzhambul", 42.9000, 71.3667),
        ("павлодар", 52.2873, 76.9674),
        ("усть-каменогорск", 49.9481, 82.6279),
        ("ust-kamenogorsk", 49.9481, 82.6279),
        ("усть каменогорск", 49.9481, 82.6279),
        ("семей", 50.4111, 80.2275),
        ("атырау", 47.1167, 51.8833),
        ("atyrau", 47.1167, 51.8833),
        ("гурьев", 47.1167, 51.8833),
        ("костанай", 53.2198, 63.6354),
        ("кустанай", 53.2198, 63.6354),
        ("кызылорда", 44.8479, 65.5092),
        ("уральск", 51.2333, 51.3667),
        ("оральск", 51.2333, 51.3667),
        ("uralsk", 51.2333, 51.3667),
        ("петропавловск", 54.8667, 69.1500),
        ("актау", 43.6500, 51.1500),
        ("туркестан", 43.2975, 68.2514),
        ("кокшетау", 53.2833, 69.3833),
        ("талдыкорган", 45.0000, 78.3667),
        ("экибастуз", 51.7333, 75.3167),
        // Karaganda region towns
        ("темиртау", 50.0546, 72.9568),
        ("сарань", 49.7833, 72.9167),
        ("жезказган", 47.7972, 67.7128),
        ("жезқазған", 47.7972, 67.7128),
        ("балхаш", 46.8486, 74.9953),
        ("балқаш", 46.8486, 74.9953),
        ("осакаровка", 50.5500, 72.5500),
        ("приозерск", 46.0500, 73.9167),
        // Akmola region
        ("степногорск", 52.3500, 71.8833),
        ("щучинск", 52.9333, 70.2333),
        ("степняк", 52.8500, 71.9000),
        ("акколь", 51.9750, 70.9417),
        ("атбасар", 51.8167, 68.3500),
        ("есиль", 51.9617, 66.4078),
        ("державинск", 51.0833, 66.3167),
        ("аркалык", 50.2500, 66.9000),
        ("шортанды", 51.5667, 71.0167),
        ("красный яр", 52.6000, 70.1000),
        ("косшы", 51.1833, 71.5833),
        // Kostanay region
        ("рудный", 52.9667, 63.1167),
        ("лисаковск", 52.6500, 62.5000),
        ("житикара", 52.1833, 61.2000),
        ("тобыл", 53.0000, 62.8667),
        ("тобол", 53.0000, 62.8667),
        ("фёдоровка", 53.4833, 62.1500),
        ("федоровка", 53.4833, 62.1500),
        // North Kazakhstan region
        ("мамлютка", 54.6167, 68.7000),
        ("булаево", 54.9000, 70.4500),
        ("пресновка", 54.9500, 68.4167),
        // Pavlodar region
        ("аксу", 52.4469, 76.9139),
        // East Kazakhstan region
        ("риддер", 50.3500, 83.5167),
        ("аягоз", 47.9667, 80.4333),
        ("зыряновск", 49.7167, 84.2667),
        ("шемонаиха", 50.6333, 81.9167),
        ("глубокое", 50.1167, 82.3000),
        ("серебрянск", 49.7000, 82.0000),
        ("курчатов", 50.7381, 78.5317),
        ("кокпекты", 50.3667, 82.7667),
        ("бескарагай", 51.2833, 79.3833),
        // Aktobe region
        ("хромтау", 50.2667, 58.4500),
        ("алга", 49.9000, 57.3333),
        ("кандыагаш", 49.4667, 57.4000),
        // Atyrau region
        ("кульсары", 46.9833, 54.0167),
        ("ганюшкино", 46.5833, 52.0000),
        ("индербор", 48.5667, 51.8833),
        ("индер", 48.5667, 51.8833),
        // Mangystau region
        ("жанаозен", 43.3400, 52.8600),
        ("форт-шевченко", 44.5000, 50.2500),
        ("бейнеу", 45.2500, 55.1000),
        // Kyzylorda region
        ("аральск", 46.7928, 61.6700),
        ("казалы", 45.7600, 62.1067),
        ("жалагаш", 45.0167, 64.6000),
        ("теренозек", 44.9833, 64.1167),
        ("байконыр", 45.6214, 63.3144),
        // Turkestan region
        ("арысь", 42.4333, 68.8000),
        ("кентау", 43.5167, 68.5000),
        ("шардара", 41.2500, 68.0833),
        ("жанатас", 43.5843, 70.6198),
        ("каратау", 43.1833, 70.7167),
        ("шу", 43.5972, 73.7669),
        ("ленгер", 42.1833, 69.8833),
        ("сайрам", 42.3100, 69.7400),
        ("бадам", 42.3100, 69.7400),
        ("отрар", 42.8667, 68.2500),
        // Almaty region
        ("каскелен", 43.1978, 76.6206),
        ("талгар", 43.3028, 77.2428),
        ("есик", 43.3572, 77.4442),
        ("капшагай", 43.8667, 77.0667),
        ("капчагай", 43.8667, 77.0667),
        ("конаев", 43.8667, 77.0667),
        ("тургень", 43.1833, 77.7833),
        ("кокпек", 43.4300, 77.4500),
        ("кыргауылды", 43.3000, 77.2000),
        ("текели", 44.8667, 78.7167),
        ("жаркент", 44.1667, 80.0000),
        ("хоргос", 44.2000, 80.4167),
        // Latin spellings
        ("aktau", 43.6500, 51.1500),
        ("almaty", 43.2220, 76.8512),
        ("astana", 51.1694, 71.4491),
        ("pavlodar", 52.2873, 76.9674),
        ("karaganda", 49.8047, 73.1094),
        ("mangystau", 43.6500, 51.1500),
        // Region/oblast aliases resolve to the regional center
        ("карагандинская", 49.8047, 73.1094),
        ("карагандинская обл", 49.8047, 73.1094),
        ("карагандинская область", 49.8047, 73.1094),
        ("акмолинская", 51.1694, 71.4491),
        ("акмолинская обл", 51.1694, 71.4491),
        ("акмолинская область", 51.1694, 71.4491),
        ("алматинская", 43.2220, 76.8512),
        ("алматинская обл", 43.2220, 76.8512),
        ("алматинская область", 43.2220, 76.8512),
        ("туркестанская", 42.3417, 69.5901),
        ("туркестанская обл", 42.3417, 69.5901),
        ("туркестанская область", 42.3417, 69.5901),
        ("южно-казахстанская", 42.3417, 69.5901),
        ("юко", 42.3417, 69.5901),
        ("северо-казахстанская", 54.8667, 69.1500),
        ("северо-казахстанская область", 54.8667, 69.1500),
        ("ско", 54.8667, 69.1500),
        ("восточно-казахстанская", 49.9481, 82.6279),
        ("восточно-казахстанская область", 49.9481, 82.6279),
        ("вко", 49.9481, 82.6279),
        ("западно-казахстанская", 51.2333, 51.3667),
        ("западно-казахстанская область", 51.2333, 51.3667),
        ("зко", 51.2333, 51.3667),
        ("актюбинская", 50.2839, 57.1670),
        ("актюбинская обл", 50.2839, 57.1670),
        ("актюбинская область", 50.2839, 57.1670),
        ("атырауская", 47.1167, 51.8833),
        ("атырауская обл", 47.1167, 51.8833),
        ("атырауская область", 47.1167, 51.8833),
        ("жамбылская", 42.9000, 71.3667),
        ("жамбылская обл", 42.9000, 71.3667),
        ("жамбылская область", 42.9000, 71.3667),
        ("костанайская", 53.2198, 63.6354),
        ("костанайская обл", 53.2198, 63.6354),
        ("костанайская область", 53.2198, 63.6354),
        ("кызылординская", 44.8479, 65.5092),
        ("кызылординская обл", 44.8479, 65.5092),
        ("кызылординская область", 44.8479, 65.5092),
        ("мангистауская", 43.6500, 51.1500),
        ("мангистауская обл", 43.6500, 51.1500),
        ("мангистауская область", 43.6500, 51.1500),
        ("павлодарская", 52.2873, 76.9674),
        ("павлодарская обл", 52.2873, 76.9674),
        ("павлодарская область", 52.2873, 76.9674),
        ("абайская", 50.4111, 80.2275),
        ("абайская обл", 50.4111, 80.2275),
        ("абайская область", 50.4111, 80.2275),
        ("улытауская", 47.7972, 67.7128),
        ("улытауская обл", 47.7972, 67.7128),
        ("улытауская область", 47.7972, 67.7128),
        // Foreign / neighboring
        ("москва", 55.7558, 37.6173),
        ("санкт-петербург", 59.9311, 30.3609),
        ("бишкек", 42.8746, 74.5698),
        ("ташкент", 41.2995, 69.2401),
    ];

    entries
        .iter()
        .map(|(name, lat, lon)| (*name, GeoPoint { lat: *lat, lon: *lon }))
        .collect()
});

/// Resolve a city string to coordinates: exact match, then first
/// comma-separated token, then contains-match against names of at
/// least 4 characters (short names cause false positives).
pub fn resolve_city(city: &str) -> (Option<f64>, Option<f64>, &'static str) {
    let lower = city.to_lowercase();
    let lower = lower.trim();

    if let Some(point) = CITY_TABLE.get(lower) {
        return (Some(point.lat), Some(point.lon), GEO_KNOWN);
    }

    if let Some(idx) = lower.find(',') {
        let first_token = lower[..idx].trim();
        if let Some(point) = CITY_TABLE.get(first_token) {
            return (Some(point.lat), Some(point.lon), GEO_KNOWN);
        }
    }

    for (name, point) in CITY_TABLE.iter() {
        if name.chars().count() >= 4 && lower.contains(name) {
            return (Some(point.lat), Some(point.lon), GEO_KNOWN);
        }
    }

    (None, None, GEO_UNKNOWN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let (lat, lon, status) = resolve_city("Алматы");
        assert_eq!(status, GEO_KNOWN);
        assert_eq!(lat, Some(43.2220));
        assert_eq!(lon, Some(76.8512));
    }

    #[test]
    fn test_first_token_match() {
        let (lat, _, status) = resolve_city("Алматы, пр. Достык 12");
        assert_eq!(status, GEO_KNOWN);
        assert_eq!(lat, Some(43.2220));
    }

    #[test]
    fn test_contains_match() {
        let (lat, _, status) = resolve_city("г. Караганда (центр)");
        assert_eq!(status, GEO_KNOWN);
        assert_eq!(lat, Some(49.8047));
    }

    #[test]
    fn test_latin_spelling() {
        let (_, lon, status) = resolve_city("Shymkent");
        assert_eq!(status, GEO_KNOWN);
        assert_eq!(lon, Some(69.5901));
    }

    #[test]
    fn test_region_alias() {
        let (lat, _, status) = resolve_city("Акмолинская область");
        assert_eq!(status, GEO_KNOWN);
        assert_eq!(lat, Some(51.1694));
    }

    #[test]
    fn test_unknown_city() {
        let (lat, lon, status) = resolve_city("Нарния");
        assert_eq!(status, GEO_UNKNOWN);
        assert!(lat.is_none() && lon.is_none());
    }
}
