//! Example: Robust accelerometer calibration
//!
//! Simulates an accelerometer held still in many orientations, corrupts part
//! of the readings (bumps while the device was being moved) and recovers
//! bias, scale factors and cross-coupling with every robust method.

use inlier_calib::models::TriadCalibration;
use inlier_calib::types::{Measurement, SpecificForceSample};
use inlier_calib::{calibrate_accelerometer, CalibrationSettings, RobustMethod};
use nalgebra::Vector3;
use rand::Rng;

const GRAVITY: f64 = 9.81;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Robust Accelerometer Calibration Example ===\n");

    let n_inliers = 60;
    let n_outliers = 15;
    let n_total = n_inliers + n_outliers;

    let truth = TriadCalibration::from_components(
        Vector3::new(0.08, -0.05, 0.12),
        Vector3::new(1.5e-3, -2.0e-3, 0.8e-3),
        3.0e-4,
        -1.2e-4,
        2.2e-4,
        4.0e-4,
        -3.1e-4,
        1.7e-4,
    );
    println!("True bias: {:?}", truth.bias_array());
    println!("True scale factors: {:?}\n", truth.scale_factors().as_slice());

    let mut rng = rand::thread_rng();
    let mut measurements = Vec::with_capacity(n_total);
    let mut scores = Vec::with_capacity(n_total);
    for i in 0..n_total {
        let direction = Vector3::new(
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
            rng.gen_range(-1.0..1.0),
        )
        .normalize();
        let expected = GRAVITY * direction;
        let mut measured = truth.distort(&expected);
        // White noise of about 1 mg
        measured += Vector3::new(
            rng.gen_range(-1e-2..1e-2),
            rng.gen_range(-1e-2..1e-2),
            rng.gen_range(-1e-2..1e-2),
        );
        let outlier = i >= n_inliers;
        if outlier {
            measured += Vector3::new(
                rng.gen_range(-2.0..2.0),
                rng.gen_range(-2.0..2.0),
                rng.gen_range(-2.0..2.0),
            );
        }
        measurements.push(Measurement::with_std_dev(
            SpecificForceSample::new(expected, measured),
            1e-2,
        ));
        // Stillness detectors report lower quality for disturbed readings
        scores.push(if outlier { rng.gen_range(0.0..0.5) } else { rng.gen_range(0.5..1.0) });
    }
    println!("Generated {} inliers and {} outliers\n", n_inliers, n_outliers);

    for method in RobustMethod::ALL {
        let settings = CalibrationSettings {
            threshold: 0.05,
            ..CalibrationSettings::with_method(method)
        };
        let quality = method.requires_quality_scores().then(|| scores.clone());
        let result = calibrate_accelerometer(measurements.clone(), settings, quality)?;

        println!("{} Results:", method);
        println!(
            "  Found {} inliers out of {} measurements in {} iterations",
            result.inliers_data.inlier_count, n_total, result.iterations
        );
        println!("  Bias: {:?}", result.model.bias_array());
        let bias_error = (result.model.bias - truth.bias).norm();
        println!("  Bias error: {:.2e} m/s^2", bias_error);
        if let Some(cov) = &result.covariance {
            println!(
                "  Bias std: [{:.2e}, {:.2e}, {:.2e}]",
                cov[(0, 0)].sqrt(),
                cov[(1, 1)].sqrt(),
                cov[(2, 2)].sqrt()
            );
        }
        println!();
    }

    Ok(())
}
