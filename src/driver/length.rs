use nalgebra::Vector3;

use crate::config::LengthConfig;
use crate::math::{clamp01, exp_follow};
use crate::rig::{BoneId, Rig};

/// 観測された腕セグメント長へボーン長を合わせる
///
/// 子ボーンのローカル位置をバインド位置×比率へ寄せることで
/// セグメントを伸縮させる。比率はクランプして暴れを抑え、
/// 遠位（手）は近位より速く追従させる。
pub struct LengthFitter {
    config: LengthConfig,
}

impl LengthFitter {
    pub fn from_config(config: &LengthConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    /// 片腕チェーンの長さを合わせる
    ///
    /// s/e/w は肩・肘・手首の観測ワールド点。
    /// fore_bind_local / hand_bind_local はバインド時のローカル位置。
    /// 現在のボーン間距離が退化しているフレームは何もしない。
    #[allow(clippy::too_many_arguments)]
    pub fn fit(
        &self,
        rig: &mut Rig,
        upper: BoneId,
        fore: BoneId,
        hand: BoneId,
        s: Vector3<f32>,
        e: Vector3<f32>,
        w: Vector3<f32>,
        fore_bind_local: Vector3<f32>,
        hand_bind_local: Vector3<f32>,
        dt: f32,
    ) {
        if !self.config.enabled {
            return;
        }

        let desired_upper = (e - s).norm();
        let desired_lower = (w - e).norm();

        let current_upper = (rig.world_position(fore) - rig.world_position(upper)).norm();
        let current_lower = (rig.world_position(hand) - rig.world_position(fore)).norm();
        if current_upper < 1e-4 || current_lower < 1e-4 {
            return;
        }

        let su = (desired_upper / current_upper)
            .clamp(self.config.min_len_scale, self.config.max_len_scale);
        let sl = (desired_lower / current_lower)
            .clamp(self.config.min_len_scale, self.config.max_len_scale);

        let su = 1.0 + (su - 1.0) * clamp01(self.config.proximal_weight);
        let sl = 1.0 + (sl - 1.0) * clamp01(self.config.distal_weight);

        let target_fore = fore_bind_local * su;
        let target_hand = hand_bind_local * sl;

        let t = exp_follow(self.config.follow_rate, dt);
        let t_hand = exp_follow(self.config.follow_rate * self.config.distal_rate_mul, dt);

        let fore_node = rig.node_mut(fore);
        fore_node.local_position = fore_node.local_position.lerp(&target_fore, t);
        let hand_node = rig.node_mut(hand);
        hand_node.local_position = hand_node.local_position.lerp(&target_hand, t_hand);
    }
}
