//! Kalman filter fusing altimeter and vertical-acceleration readings into a
//! smoothed (position, velocity, acceleration) state.
//!
//! The process model is constant-acceleration kinematics; position and
//! acceleration are measured directly, velocity never is. Configured noise
//! values are standard deviations and get squared into the Q and R
//! diagonals here.

use nalgebra::{Matrix2, Matrix3, SMatrix, Vector2, Vector3};
use thiserror::Error;

use crate::config::FlightConfig;
use crate::constants::MIN_DT_SECONDS;

#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error("innovation covariance is singular; check measurement noise configuration")]
    SingularInnovation,
}

pub struct StateEstimator {
    /// State [y, v, a]. Written only by `update`.
    x: Vector3<f64>,
    /// Error covariance.
    p: Matrix3<f64>,
    /// Process noise covariance.
    q: Matrix3<f64>,
    /// Measurement noise covariance.
    r: Matrix2<f64>,
    /// State-to-measurement map: altitude and acceleration are observed.
    h: SMatrix<f64, 2, 3>,
}

impl StateEstimator {
    pub fn from_config(config: &FlightConfig) -> Self {
        StateEstimator {
            x: Vector3::zeros(),
            p: Matrix3::identity(),
            q: Matrix3::from_diagonal(&Vector3::new(
                config.model_std_y * config.model_std_y,
                config.model_std_v * config.model_std_v,
                config.model_std_a * config.model_std_a,
            )),
            r: Matrix2::from_diagonal(&Vector2::new(
                config.measurement_std_y * config.measurement_std_y,
                config.measurement_std_a * config.measurement_std_a,
            )),
            h: SMatrix::<f64, 2, 3>::new(
                1.0, 0.0, 0.0, //
                0.0, 0.0, 1.0,
            ),
        }
    }

    /// Folds one cycle's measurements into the state, then projects the
    /// state one step ahead. Call exactly once per control cycle,
    /// immediately after the sensors are read; afterwards the accessors
    /// return the prediction for the coming cycle.
    pub fn update(
        &mut self,
        y_measured: f64,
        a_measured: f64,
        dt_seconds: f64,
    ) -> Result<(), EstimatorError> {
        let dt = dt_seconds.max(MIN_DT_SECONDS);
        let phi = Matrix3::new(
            1.0, dt, 0.5 * dt * dt, //
            0.0, 1.0, dt, //
            0.0, 0.0, 1.0,
        );
        let z = Vector2::new(y_measured, a_measured);

        // Kalman gain
        let s: Matrix2<f64> = self.h * self.p * self.h.transpose() + self.r;
        let s_inv = s.try_inverse().ok_or(EstimatorError::SingularInnovation)?;
        let k: SMatrix<f64, 3, 2> = self.p * self.h.transpose() * s_inv;

        // Correct state and covariance from the measurement
        self.x += k * (z - self.h * self.x);
        self.p = (Matrix3::identity() - k * self.h) * self.p;

        // Project to the next time step
        self.x = phi * self.x;
        self.p = phi * self.p * phi.transpose() + self.q;

        Ok(())
    }

    pub fn altitude(&self) -> f64 {
        self.x[0]
    }

    pub fn velocity(&self) -> f64 {
        self.x[1]
    }

    pub fn acceleration(&self) -> f64 {
        self.x[2]
    }

    pub fn covariance(&self) -> &Matrix3<f64> {
        &self.p
    }
}
