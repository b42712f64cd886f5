use approx::assert_relative_eq;
use lattice_core::params::AcqParams;

// ---------------------------------------------------------------------------
// Derived fields
// ---------------------------------------------------------------------------

#[test]
fn test_dz_final_applies_deskew_geometry_in_samplescan() {
    let mut p = AcqParams::new();
    p.dz = Some(0.5);
    p.set_angle(Some(31.5));

    let expected = (0.5 * (31.5f64.to_radians()).sin() * 10_000.0).round() / 10_000.0;
    assert_relative_eq!(p.dz_final().unwrap(), expected, epsilon = 1e-12);
}

#[test]
fn test_dz_final_is_raw_dz_without_samplescan() {
    let mut p = AcqParams::new();
    p.dz = Some(0.4);
    p.set_samplescan(false);
    assert_relative_eq!(p.dz_final().unwrap(), 0.4, epsilon = 1e-12);
}

#[test]
fn test_dz_final_rounds_to_four_decimals() {
    let mut p = AcqParams::new();
    p.dz = Some(0.123456);
    assert_relative_eq!(p.dz_final().unwrap(), 0.1235, epsilon = 1e-12);
}

#[test]
fn test_dz_final_none_without_dz() {
    let p = AcqParams::new();
    assert!(p.dz_final().is_none());
}

#[test]
fn test_deskew_is_angle_in_samplescan_mode() {
    let mut p = AcqParams::new();
    p.set_angle(Some(31.5));
    assert_relative_eq!(p.deskew(), 31.5);
}

#[test]
fn test_deskew_is_zero_without_samplescan() {
    let mut p = AcqParams::new();
    p.dz = Some(0.5);
    p.set_samplescan(false);
    assert_relative_eq!(p.deskew(), 0.0);
}

#[test]
fn test_voxel_is_dzfinal_dx_dx() {
    let mut p = AcqParams::new();
    p.dz = Some(0.5);
    p.dx = Some(0.104);
    p.set_angle(Some(31.5));

    let (vz, vy, vx) = p.voxel().unwrap();
    assert_relative_eq!(vz, p.dz_final().unwrap(), epsilon = 1e-12);
    assert_relative_eq!(vy, 0.104, epsilon = 1e-12);
    assert_relative_eq!(vx, 0.104, epsilon = 1e-12);
}

#[test]
fn test_voxel_none_without_pixel_size() {
    let mut p = AcqParams::new();
    p.dz = Some(0.5);
    assert!(p.voxel().is_none());
}

// ---------------------------------------------------------------------------
// Samplescan latch
// ---------------------------------------------------------------------------

#[test]
fn test_positive_angle_latches_samplescan_on() {
    let mut p = AcqParams::new();
    assert!(!p.samplescan());
    p.set_angle(Some(32.8));
    assert!(p.samplescan());
}

#[test]
fn test_zero_angle_does_not_touch_samplescan() {
    let mut p = AcqParams::new();
    p.set_angle(Some(0.0));
    assert!(!p.samplescan());
}

// The latch is one-way: documented behavior of the acquisition
// settings, never verified against an instrument that clears it.
#[test]
fn test_resetting_angle_leaves_samplescan_latched() {
    let mut p = AcqParams::new();
    p.set_angle(Some(32.8));
    p.set_angle(Some(0.0));
    assert!(p.samplescan());
    p.set_angle(None);
    assert!(p.samplescan());
}

// ---------------------------------------------------------------------------
// Completeness / display
// ---------------------------------------------------------------------------

#[test]
fn test_incomplete_without_dz_or_dx() {
    let mut p = AcqParams::new();
    assert!(!p.is_complete());
    p.dz = Some(0.5);
    assert!(!p.is_complete());
    p.dx = Some(0.104);
    assert!(p.is_complete());
}

#[test]
fn test_display_renders_stored_fields_only() {
    let mut p = AcqParams::new();
    p.dz = Some(0.5);
    p.set_angle(Some(31.5));
    let s = p.to_string();
    assert!(s.contains("angle"), "got: {s}");
    assert!(!s.contains("dzFinal"), "got: {s}");
    assert!(!s.contains("deskew"), "got: {s}");
}

#[test]
fn test_serialization_excludes_derived_fields() {
    let mut p = AcqParams::new();
    p.dz = Some(0.5);
    p.dx = Some(0.104);
    p.set_angle(Some(31.5));

    let json = serde_json::to_value(&p).unwrap();
    assert!(json.get("dz").is_some());
    assert!(json.get("angle").is_some());
    assert!(json.get("dz_final").is_none());
    assert!(json.get("voxel").is_none());
}
