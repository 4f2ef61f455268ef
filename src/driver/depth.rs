use crate::config::DepthConfig;
use crate::math::exp_follow;

/// 肩幅からカメラ距離を推定する
///
/// 正規化座標での見かけの肩幅は距離に反比例するので、
/// depth = base * (ref_width / width) で単眼でも奥行きが出る。
/// 結果は設定レンジにクランプされる。
pub struct DepthEstimator {
    config: DepthConfig,
    prev: Option<f32>,
}

impl DepthEstimator {
    pub fn from_config(config: &DepthConfig) -> Self {
        Self {
            config: config.clone(),
            prev: None,
        }
    }

    /// 見かけの幅（正規化座標）から深度を推定する
    ///
    /// 幅がほぼ零（両点が重なるフレーム）は推定不能としてNoneを返し、
    /// 内部状態も更新しない。
    pub fn estimate(&mut self, width01: f32, dt: f32) -> Option<f32> {
        if width01 < 1e-4 {
            return None;
        }
        let raw = self.config.base_depth_m * (self.config.ref_width01 / width01);
        let clamped = raw.clamp(self.config.min_m, self.config.max_m);

        let next = match (self.prev, self.config.follow_rate > 0.0) {
            (Some(prev), true) => {
                let t = exp_follow(self.config.follow_rate, dt);
                let mut step = (clamped - prev) * t;
                // 1フレームの変化量を制限して飛びを抑える
                let max_step = self.config.max_step_per_sec * dt;
                if max_step > 0.0 {
                    step = step.clamp(-max_step, max_step);
                }
                prev + step
            }
            _ => clamped,
        };
        self.prev = Some(next);
        Some(next)
    }

    /// 直近の有効な推定値
    pub fn last(&self) -> Option<f32> {
        self.prev
    }

    pub fn reset(&mut self) {
        self.prev = None;
    }
}
