use crate::camera::CameraView;
use crate::config::{BodyScaleConfig, DepthConfig};
use crate::driver::DepthEstimator;
use crate::landmark::LandmarkFrame;
use crate::math::{clamp01, exp_follow};

/// 外部の体格スケール係数の供給元
///
/// 1.0 が基準体格。リグドライバはこの係数を影響度つきで
/// スケール目標に乗せる。
pub trait BodyScaleProvider {
    fn body_scale(&self) -> f32;
}

/// 固定係数。設定値やテスト用。
impl BodyScaleProvider for f32 {
    fn body_scale(&self) -> f32 {
        *self
    }
}

/// 肩幅・腰幅の観測から体格係数を推定する供給元
///
/// 専用の深度推定を持ち、ワールド幅を基準幅で割って係数にする。
/// リグドライバ本体とは独立に更新してよい。
pub struct WidthBodyScale {
    config: BodyScaleConfig,
    depth: DepthEstimator,
    current: f32,
}

impl WidthBodyScale {
    pub fn from_config(config: &BodyScaleConfig, depth_config: &DepthConfig) -> Self {
        Self {
            config: config.clone(),
            depth: DepthEstimator::from_config(depth_config),
            current: config.fallback,
        }
    }

    /// 新しいフレームで係数を更新する。観測が取れなければ現状維持。
    pub fn update(&mut self, camera: &CameraView, frame: &LandmarkFrame, dt: f32) {
        let (ls, rs) = match frame.shoulders() {
            Some(v) => v,
            None => return,
        };
        let shoulder_width01 = (rs - ls).norm();
        if shoulder_width01 < 1e-4 {
            return;
        }
        let depth = match self.depth.estimate(shoulder_width01, dt) {
            Some(d) => d,
            None => return,
        };

        let s_shoulder = camera.world_width(ls, rs, depth);

        let mut s_hip = s_shoulder;
        let mut has_hip = false;
        if self.config.use_hips {
            if let Some((lh, rh)) = frame.hips() {
                if (rh - lh).norm() > 1e-4 {
                    s_hip = camera.world_width(lh, rh, depth);
                    has_hip = true;
                }
            }
        }

        let width_m = if self.config.use_shoulders && has_hip {
            s_shoulder + (s_hip - s_shoulder) * clamp01(self.config.hips_weight)
        } else if has_hip && !self.config.use_shoulders {
            s_hip
        } else {
            s_shoulder
        };

        let target = width_m / self.config.ref_width_m.max(1e-4);
        let t = exp_follow(self.config.follow_rate, dt);
        self.current += (target - self.current) * t;
    }

    pub fn reset(&mut self) {
        self.depth.reset();
        self.current = self.config.fallback;
    }
}

impl BodyScaleProvider for WidthBodyScale {
    fn body_scale(&self) -> f32 {
        self.current
    }
}
