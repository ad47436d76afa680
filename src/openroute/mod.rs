use anyhow::{bail, Context, Result};
use log::{debug, info};
use mapcompose::GeoCoordinate;
use reqwest::blocking::Client;
use serde::Deserialize;

/// Resolves a free-form address to a coordinate
pub trait Geocoder {
    fn geocode(&self, address: &str) -> Result<GeoCoordinate>;
}

/// Computes the waypoints of a route between two coordinates
pub trait DirectionsProvider {
    fn directions(&self, start: GeoCoordinate, end: GeoCoordinate) -> Result<Vec<GeoCoordinate>>;
}

/// Routing profile used for directions
const PROFILE: &str = "driving-car";

/// Client for the OpenRouteService geocoding and directions APIs
#[derive(Clone)]
pub struct OpenRouteClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenRouteClient {
    pub fn new(client: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    fn get(&self, path: &str, query: &[(&str, &str)]) -> Result<String> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Requesting {}", url);
        let response = self.client.get(&url)
            .query(&[("api_key", self.api_key.as_str())])
            .query(query)
            .send()
            .with_context(|| format!("Failed to send request to {}", url))?;

        let status = response.status();
        let body = response.text()
            .context("Failed to read response body")?;
        if !status.is_success() {
            bail!("Request to {} failed: HTTP {}: {}", url, status, body);
        }
        Ok(body)
    }
}

impl Geocoder for OpenRouteClient {
    fn geocode(&self, address: &str) -> Result<GeoCoordinate> {
        let body = self.get("/geocode/search", &[("text", address)])?;
        let coordinate = parse_geocode_response(&body)
            .with_context(|| format!("Failed to geocode {:?}", address))?;
        info!("Geocoded {:?} to {}", address, coordinate);
        Ok(coordinate)
    }
}

impl DirectionsProvider for OpenRouteClient {
    fn directions(&self, start: GeoCoordinate, end: GeoCoordinate) -> Result<Vec<GeoCoordinate>> {
        let start = start.to_string();
        let end = end.to_string();
        let path = format!("/v2/directions/{}", PROFILE);
        let body = self.get(&path, &[("start", start.as_str()), ("end", end.as_str())])?;
        let waypoints = parse_directions_response(&body)
            .with_context(|| format!("Failed to get directions from {} to {}", start, end))?;
        info!("Route from {} to {} has {} waypoints", start, end, waypoints.len());
        Ok(waypoints)
    }
}

#[derive(Debug, Deserialize)]
struct FeatureCollection<G> {
    #[serde(default = "Vec::new")]
    features: Vec<Feature<G>>,
}

#[derive(Debug, Deserialize)]
struct Feature<G> {
    geometry: Option<G>,
}

#[derive(Debug, Deserialize)]
struct PointGeometry {
    coordinates: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct LineStringGeometry {
    coordinates: Vec<Vec<f64>>,
}

fn to_coordinate(position: &[f64]) -> Result<GeoCoordinate> {
    match position {
        [lon, lat, ..] => Ok(GeoCoordinate::new(*lon, *lat)),
        _ => bail!("Position has {} components, expected at least 2", position.len()),
    }
}

/// Coordinate of the best match in a geocoding response
pub fn parse_geocode_response(body: &str) -> Result<GeoCoordinate> {
    let collection: FeatureCollection<PointGeometry> = serde_json::from_str(body)
        .context("Failed to parse geocoding response")?;
    let geometry = collection.features.into_iter().next()
        .context("Geocoding response has no features")?
        .geometry
        .context("Geocoding result has no geometry")?;
    to_coordinate(&geometry.coordinates)
}

/// Waypoints of the first route in a directions response
pub fn parse_directions_response(body: &str) -> Result<Vec<GeoCoordinate>> {
    let collection: FeatureCollection<LineStringGeometry> = serde_json::from_str(body)
        .context("Failed to parse directions response")?;
    let geometry = collection.features.into_iter().next()
        .context("Directions response has no features")?
        .geometry
        .context("Route has no geometry")?;
    if geometry.coordinates.is_empty() {
        bail!("Route has no coordinates");
    }
    geometry.coordinates.iter()
        .map(|position| to_coordinate(position))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geocode_takes_first_feature() {
        let body = r#"{
            "type": "FeatureCollection",
            "features": [
                { "type": "Feature", "geometry": { "type": "Point", "coordinates": [16.3738, 48.2082] },
                  "properties": { "label": "Vienna, Austria" } },
                { "type": "Feature", "geometry": { "type": "Point", "coordinates": [-77.26, 38.9] } }
            ]
        }"#;
        assert_eq!(parse_geocode_response(body).unwrap(), GeoCoordinate::new(16.3738, 48.2082));
    }

    #[test]
    fn test_geocode_without_results() {
        let err = parse_geocode_response(r#"{ "type": "FeatureCollection", "features": [] }"#).unwrap_err();
        assert!(err.to_string().contains("no features"));
        assert!(parse_geocode_response(r#"{ "error": "Access to this API has been disallowed" }"#).is_err());
        assert!(parse_geocode_response("<html>").is_err());
        assert!(parse_geocode_response(r#"{ "features": [ { "geometry": { "coordinates": [16.3] } } ] }"#).is_err());
    }

    #[test]
    fn test_directions_keeps_order() {
        let body = r#"{
            "type": "FeatureCollection",
            "features": [ {
                "geometry": {
                    "type": "LineString",
                    "coordinates": [[16.3738, 48.2082, 170.0], [16.38, 48.21], [16.4, 48.22]]
                },
                "properties": { "summary": { "distance": 2450.1 } }
            } ]
        }"#;
        let waypoints = parse_directions_response(body).unwrap();
        assert_eq!(
            waypoints,
            vec![
                GeoCoordinate::new(16.3738, 48.2082),
                GeoCoordinate::new(16.38, 48.21),
                GeoCoordinate::new(16.4, 48.22),
            ]
        );
    }

    #[test]
    fn test_directions_missing_parts() {
        assert!(parse_directions_response(r#"{ "features": [] }"#).is_err());
        assert!(parse_directions_response(r#"{ "features": [ {} ] }"#).is_err());
        let err = parse_directions_response(r#"{ "features": [ { "geometry": { "coordinates": [] } } ] }"#).unwrap_err();
        assert!(err.to_string().contains("no coordinates"));
    }
}
