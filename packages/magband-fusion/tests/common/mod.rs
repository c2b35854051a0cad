//! Shared fixtures: build raw LSB samples from physical ground truth, the
//! same way the band firmware would quantize them.
#![allow(dead_code)] // each test binary uses a subset

use magband_fusion::units::{ACCEL_LSB_PER_G, GYRO_LSB_PER_DPS, MAG_UT_PER_LSB};
use magband_types::{Quaternion, RawImuSample, Vector3};

/// Quantize physical values into a raw sample. `mag_aligned_ut` is given in
/// the aligned (accel/gyro) frame; the wire carries the magnetometer's
/// chip-native axis order, so x/y are swapped here and swapped back by
/// Stage 1.
pub fn raw_from_physical(
    t_ms: u32,
    accel_g: Vector3,
    gyro_dps: Vector3,
    mag_aligned_ut: Vector3,
) -> RawImuSample {
    let q = |v: f64| -> i16 { v.round().clamp(i16::MIN as f64, i16::MAX as f64) as i16 };
    RawImuSample {
        t_ms,
        ax: q(accel_g.x * ACCEL_LSB_PER_G),
        ay: q(accel_g.y * ACCEL_LSB_PER_G),
        az: q(accel_g.z * ACCEL_LSB_PER_G),
        gx: q(gyro_dps.x * GYRO_LSB_PER_DPS),
        gy: q(gyro_dps.y * GYRO_LSB_PER_DPS),
        gz: q(gyro_dps.z * GYRO_LSB_PER_DPS),
        mx: q(mag_aligned_ut.y / MAG_UT_PER_LSB),
        my: q(mag_aligned_ut.x / MAG_UT_PER_LSB),
        mz: q(mag_aligned_ut.z / MAG_UT_PER_LSB),
        mode: 0,
        context: 0,
        grip: false,
        light: None,
        battery_pct: None,
        temperature_c: Some(23),
        touch: None,
    }
}

/// Stationary flat sample: gravity on +z, Earth field `(h, 0, v)` µT, plus an
/// optional device-frame anomaly.
pub fn quiescent_sample(t_ms: u32, earth_ut: Vector3, anomaly_ut: Vector3) -> RawImuSample {
    raw_from_physical(
        t_ms,
        Vector3::new(0.0, 0.0, 1.0),
        Vector3::zeros(),
        earth_ut.add(&anomaly_ut),
    )
}

/// Sample of a device teleported to attitude `q` under gravity and the given
/// world-frame Earth field, with a device-frame hard-iron offset.
pub fn attitude_sample(
    t_ms: u32,
    q: &Quaternion,
    earth_world_ut: Vector3,
    hard_iron_ut: Vector3,
) -> RawImuSample {
    let accel = q.rotate_inverse(Vector3::new(0.0, 0.0, 1.0));
    let mag = q.rotate_inverse(earth_world_ut).add(&hard_iron_ut);
    raw_from_physical(t_ms, accel, Vector3::zeros(), mag)
}
