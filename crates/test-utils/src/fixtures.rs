//! Common test fixtures for tilefetch tests.
//!
//! This module provides pre-defined inputs that represent common
//! download scenarios.

/// Bounding boxes as `(min_x, min_y, max_x, max_y)` in WGS84 degrees.
pub mod bbox {
    /// Small area on the west coast of Greenland (UTM zone 22N).
    ///
    /// About 2.8 km by 2.3 km once projected.
    pub const GREENLAND_TEST: (f64, f64, f64, f64) = (-51.13, 69.204, -51.06, 69.225);

    /// Lake of Zurich area (UTM zone 32N), about 15 km by 11 km.
    pub const ZURICH: (f64, f64, f64, f64) = (8.5, 47.2, 8.7, 47.3);

    /// Southern hemisphere box around Cape Town (UTM zone 34S).
    pub const CAPE_TOWN: (f64, f64, f64, f64) = (18.35, -34.0, 18.55, -33.85);

    /// Invalid bbox (min > max)
    pub const INVALID: (f64, f64, f64, f64) = (10.0, 10.0, 5.0, 5.0);
}

/// Acquisition date inputs.
pub mod dates {
    pub const SINGLE_DAY: &str = "2019-08-01";

    pub const THREE_DAYS: [&str; 3] = ["2019-08-01", "2019-08-02", "2019-08-03"];

    /// Two dates are read as an inclusive range.
    pub const AUGUST_RANGE: [&str; 2] = ["2019-08-01", "2019-08-10"];
}

/// Data collection names.
pub mod collections {
    pub const SENTINEL2_L2A: &str = "SENTINEL2_L2A";
    pub const SENTINEL1_IW: &str = "SENTINEL1_IW";
    pub const SENTINEL3_OLCI: &str = "SENTINEL3_OLCI";
}

/// Evaluation scripts.
pub mod evalscript {
    /// True color with a data mask band.
    pub const TRUE_COLOR: &str = r#"//VERSION=3
function setup() {
  return {
    input: ["B02", "B03", "B04", "dataMask"],
    output: { bands: 4 }
  };
}
function evaluatePixel(sample) {
  let gain = 2.5;
  return [sample.B04 * gain, sample.B03 * gain, sample.B02 * gain, sample.dataMask];
}
"#;

    pub const TRUE_COLOR_URL: &str =
        "https://custom-scripts.sentinel-hub.com/custom-scripts/sentinel-2/true_color/script.js";
}

/// Credential file contents (client id, then secret).
pub mod credentials {
    pub const VALID: &str = "test-client-id\ntest-client-secret\n";

    pub const MISSING_SECRET: &str = "test-client-id\n";
}

/// A request record as written next to a raw response.
pub mod request_record {
    pub const SPLIT_BOX: &str = r#"{
  "request": {
    "url": "https://services.sentinel-hub.com/api/v1/process",
    "payload": {
      "input": {
        "bounds": {
          "bbox": [500000.0, 7677000.0, 501390.0, 7678170.0],
          "properties": { "crs": "http://www.opengis.net/def/crs/EPSG/0/32622" }
        },
        "data": [
          {
            "type": "sentinel-2-l2a",
            "dataFilter": {
              "timeRange": { "from": "2019-08-02T00:00:00Z", "to": "2019-08-02T23:59:59Z" }
            },
            "processing": { "orthorectify": true }
          }
        ]
      },
      "output": {
        "width": 139,
        "height": 117,
        "responses": [{ "identifier": "default", "format": { "type": "image/tiff" } }]
      },
      "evalscript": "//VERSION=3"
    }
  },
  "timestamp": "2019-08-05T10:00:00Z"
}"#;
}
