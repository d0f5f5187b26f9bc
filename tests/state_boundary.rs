//! Resolver state-boundary, PO-box, and ZIP9 override scenarios.

use std::sync::Arc;

use cmspipe::{GeographyTables, NearestZipResolver, ResolverOptions, TablesDump};
use cmspipe_geo::{
    CentroidProvenance, Zip5Locality, Zip9Override, ZipMetadata, ZipToZctaCrosswalk, ZctaCentroid,
};

fn locality(zip5: &str, state: &str, locality_code: &str) -> Zip5Locality {
    Zip5Locality {
        zip5: zip5.into(),
        state: state.into(),
        locality: locality_code.into(),
        carrier_mac: None,
        rural_flag: None,
        effective_from: "2025-01-01".into(),
        effective_to: None,
        vintage: "2025".into(),
    }
}

fn crosswalk(zip5: &str) -> ZipToZctaCrosswalk {
    ZipToZctaCrosswalk {
        zip5: zip5.into(),
        zcta5: zip5.into(),
        relationship: "Zip matches ZCTA".into(),
        weight: Some(1.0),
        vintage: "2023".into(),
        city: None,
        state: None,
    }
}

fn centroid(zcta5: &str, lat: f64, lon: f64) -> ZctaCentroid {
    ZctaCentroid {
        zcta5: zcta5.into(),
        latitude: lat,
        longitude: lon,
        vintage: "2023".into(),
        provenance: CentroidProvenance::Gazetteer,
    }
}

/// CA and NV ZIPs clustered around the Lake Tahoe state line.
fn tahoe_dump() -> TablesDump {
    let zips = [
        ("96150", "CA", 38.9170, -119.9865),
        ("96151", "CA", 38.9280, -119.9990),
        ("96152", "CA", 38.9390, -120.0110),
        ("89448", "NV", 38.9950, -119.9404),
        ("89449", "NV", 38.9630, -119.9250),
        ("89450", "NV", 39.0950, -119.9380),
    ];
    TablesDump {
        zip5_locality: zips
            .iter()
            .map(|(z, s, _, _)| locality(z, s, "01"))
            .collect(),
        crosswalk: zips.iter().map(|(z, _, _, _)| crosswalk(z)).collect(),
        centroids: zips
            .iter()
            .map(|(z, _, lat, lon)| centroid(z, *lat, *lon))
            .collect(),
        ..TablesDump::default()
    }
}

#[test]
fn tahoe_resolutions_never_cross_the_border() {
    let resolver = NearestZipResolver::new(Arc::new(GeographyTables::from(tahoe_dump())));
    let ca = ["96150", "96151", "96152"];
    let nv = ["89448", "89449", "89450"];

    for input in ca {
        let result = resolver
            .find_nearest_zip(input, &ResolverOptions::default())
            .unwrap();
        assert!(ca.contains(&result.nearest_zip.as_str()), "{input} -> {}", result.nearest_zip);
        assert_ne!(result.nearest_zip, input);
        assert!(result.distance_miles >= 0.0);
    }
    for input in nv {
        let result = resolver
            .find_nearest_zip(input, &ResolverOptions::default())
            .unwrap();
        assert!(nv.contains(&result.nearest_zip.as_str()), "{input} -> {}", result.nearest_zip);
    }
}

#[test]
fn pobox_is_excluded_even_when_geographically_closest() {
    let mut dump = tahoe_dump();
    // 94199 sits practically on top of 94107 but is a PO-box ZIP.
    for (zip5, lat, lon) in [
        ("94107", 37.7621, -122.3971),
        ("94199", 37.7625, -122.3975),
        ("94110", 37.7485, -122.4156),
    ] {
        dump.zip5_locality.push(locality(zip5, "CA", "05"));
        dump.crosswalk.push(crosswalk(zip5));
        dump.centroids.push(centroid(zip5, lat, lon));
    }
    dump.zip_metadata.push(ZipMetadata {
        zip5: "94199".into(),
        population: None,
        is_pobox: true,
    });

    let resolver = NearestZipResolver::new(Arc::new(GeographyTables::from(dump)));
    let options = ResolverOptions {
        include_trace: true,
        ..ResolverOptions::default()
    };
    let result = resolver.find_nearest_zip("94107", &options).unwrap();
    assert_ne!(result.nearest_zip, "94199");
    let trace = result.trace.unwrap();
    assert_eq!(trace.excluded_pobox, 1);
}

#[test]
fn zip9_override_drives_state_and_locality() {
    let mut dump = tahoe_dump();
    for (zip5, lat, lon) in [("94107", 37.7621, -122.3971), ("94110", 37.7485, -122.4156)] {
        dump.zip5_locality.push(locality(zip5, "CA", "05"));
        dump.crosswalk.push(crosswalk(zip5));
        dump.centroids.push(centroid(zip5, lat, lon));
    }
    dump.zip9_overrides.push(Zip9Override {
        zip9_low: "941070000".into(),
        zip9_high: "941079999".into(),
        state: "CA".into(),
        locality: "02".into(),
        rural_flag: None,
        effective_from: "2025-01-01".into(),
        effective_to: None,
        vintage: "2025".into(),
    });

    let resolver = NearestZipResolver::new(Arc::new(GeographyTables::from(dump)));
    let options = ResolverOptions {
        include_trace: true,
        ..ResolverOptions::default()
    };
    let result = resolver.find_nearest_zip("94107-1234", &options).unwrap();
    let trace = result.trace.unwrap();
    assert!(trace.zip9_hit);
    assert_eq!(trace.state, "CA");
    assert_eq!(trace.locality, "02");
    // The candidate set was drawn from California.
    assert_eq!(result.nearest_zip, "94110");

    // An input at the inclusive range endpoint still hits.
    let low_end = resolver.find_nearest_zip("941070000", &options).unwrap();
    assert!(low_end.trace.unwrap().zip9_hit);
    let high_end = resolver.find_nearest_zip("941079999", &options).unwrap();
    assert!(high_end.trace.unwrap().zip9_hit);
}

#[test]
fn trace_round_trips_through_tables_dump_serialization() {
    let dump = tahoe_dump();
    let json = serde_json::to_string(&dump).unwrap();
    let back: TablesDump = serde_json::from_str(&json).unwrap();
    let resolver = NearestZipResolver::new(Arc::new(GeographyTables::from(back)));
    assert!(resolver
        .find_nearest_zip("96150", &ResolverOptions::default())
        .is_ok());
}
