use crate::config::ScaleConfig;
use crate::math::clamp01;

/// ワールド肩幅からリグの目標スケールを推定する
///
/// 直接モードは肩幅×係数をそのまま使うので距離変化に素直だが、
/// 横向きで見かけの肩幅が潰れると服まで縮む。ベースラインモードは
/// 正面向きの良フレームだけでベースラインを養い、ポーズ比率は
/// 狭い範囲の補正に留める。
pub struct ScaleEstimator {
    config: ScaleConfig,
    baseline_pose_scale: f32,
    baseline_shoulder_world: f32,
    baseline_initialized: bool,
    locked: bool,
    last_target: Option<f32>,
}

impl ScaleEstimator {
    pub fn from_config(config: &ScaleConfig) -> Self {
        Self {
            config: config.clone(),
            baseline_pose_scale: 1.0,
            baseline_shoulder_world: 1e-3,
            baseline_initialized: false,
            locked: false,
            last_target: None,
        }
    }

    /// スケール更新を止め、以後は現在の目標値を返し続ける
    pub fn lock_now(&mut self) {
        self.locked = true;
    }

    pub fn unlock(&mut self) {
        self.locked = false;
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn last_target(&self) -> Option<f32> {
        self.last_target
    }

    pub fn reset(&mut self) {
        self.baseline_pose_scale = 1.0;
        self.baseline_shoulder_world = 1e-3;
        self.baseline_initialized = false;
        self.locked = false;
        self.last_target = None;
    }

    /// 目標スケールを更新する
    ///
    /// shoulder_width_world: ワールド肩幅（メートル）
    /// shoulder_width01: 正規化座標での肩幅（良フレーム判定用）
    /// body_scale: 外部体格係数（1.0が基準）
    pub fn update(
        &mut self,
        shoulder_width_world: f32,
        shoulder_width01: f32,
        body_scale: f32,
    ) -> Option<f32> {
        if !self.config.enabled {
            return None;
        }
        if self.locked {
            return self.last_target;
        }
        if shoulder_width_world <= 1e-4 {
            return self.last_target;
        }

        let body_applied = 1.0 + (body_scale - 1.0) * clamp01(self.config.body_scale_influence);
        let pose_now = shoulder_width_world * self.config.multiplier;

        let target = if !self.config.use_baseline {
            pose_now * body_applied
        } else {
            let good = shoulder_width01 >= self.config.baseline_min_width01;

            if !self.baseline_initialized {
                self.baseline_initialized = true;
                self.baseline_pose_scale = pose_now.max(1e-4);
                self.baseline_shoulder_world = shoulder_width_world.max(1e-4);
            } else if good && self.config.baseline_follow > 0.0 {
                let f = clamp01(self.config.baseline_follow);
                self.baseline_pose_scale += (pose_now.max(1e-4) - self.baseline_pose_scale) * f;
                self.baseline_shoulder_world +=
                    (shoulder_width_world.max(1e-4) - self.baseline_shoulder_world) * f;
            }

            // 距離・向きによる変動は限定的な補正に留める
            let ratio = (shoulder_width_world / self.baseline_shoulder_world.max(1e-4))
                .clamp(self.config.ratio_min, self.config.ratio_max);
            let ratio_applied = 1.0 + (ratio - 1.0) * clamp01(self.config.ratio_follow);

            self.baseline_pose_scale * ratio_applied * body_applied
        };

        self.last_target = Some(target);
        Some(target)
    }
}
