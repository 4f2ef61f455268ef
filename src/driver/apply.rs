use nalgebra::{UnitQuaternion, Vector3};

use crate::config::ApplyConfig;
use crate::math::{exp_follow, nlerp, smooth_damp};

use crate::rig::{BoneId, Rig};

/// 目標値をリグへ滑らかに書き込む最終段
///
/// 各ソルバは目標を置くだけで、リグに触るのはここだけ。
/// 新しい観測が来ないフレームでも直近の目標へ収束し続けるので、
/// 推論が一時的に止まっても見た目は固まらない。
pub struct RigApplier {
    config: ApplyConfig,
    pos_velocity: Vector3<f32>,
    position_target: Option<Vector3<f32>>,
    scale_target: Option<f32>,
    pivot_rotation_target: Option<UnitQuaternion<f32>>,
}

impl RigApplier {
    pub fn from_config(config: &ApplyConfig) -> Self {
        Self {
            config: config.clone(),
            pos_velocity: Vector3::zeros(),
            position_target: None,
            scale_target: None,
            pivot_rotation_target: None,
        }
    }

    pub fn set_position_target(&mut self, target: Vector3<f32>) {
        self.position_target = Some(target);
    }

    pub fn set_scale_target(&mut self, target: f32) {
        self.scale_target = Some(target);
    }

    pub fn set_pivot_rotation_target(&mut self, target: UnitQuaternion<f32>) {
        self.pivot_rotation_target = Some(target);
    }

    /// 現在の目標へ1フレーム分近づける
    pub fn apply(&mut self, rig: &mut Rig, root: BoneId, pivot: BoneId, dt: f32) {
        if let Some(target) = self.position_target {
            let node = rig.node_mut(root);
            node.local_position = smooth_damp(
                node.local_position,
                target,
                &mut self.pos_velocity,
                self.config.pos_smooth_time,
                dt,
            );
        }
        if let Some(target) = self.scale_target {
            let t = exp_follow(self.config.scale_rate, dt);
            let node = rig.node_mut(root);
            node.local_scale += (target - node.local_scale) * t;
        }
        if let Some(target) = self.pivot_rotation_target {
            let t = exp_follow(self.config.rot_rate, dt);
            let node = rig.node_mut(pivot);
            node.local_rotation = nlerp(&node.local_rotation, &target, t);
        }
    }

    /// 速度と目標を捨てる。次の観測から入り直す。
    pub fn reset(&mut self) {
        self.pos_velocity = Vector3::zeros();
        self.position_target = None;
        self.scale_target = None;
        self.pivot_rotation_target = None;
    }
}
