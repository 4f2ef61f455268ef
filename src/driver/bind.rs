use std::collections::HashMap;

use nalgebra::{UnitQuaternion, Vector3};

use crate::math::project_on_plane;
use crate::rig::{BoneId, Rig};

/// 1ボーン分のバインド姿勢
///
/// すべて親空間で保持する。姿勢解決は親空間で完結するので、
/// 実行時にワールド変換を再評価する必要がない。
#[derive(Debug, Clone)]
pub struct BoneBinding {
    /// バインド時のローカル回転
    pub local_rotation: UnitQuaternion<f32>,
    /// 最初の子へ向かう軸（親空間, 正規化済み）
    pub aim_axis: Vector3<f32>,
    /// ロール基準の前方（親空間, aim_axisに直交, 正規化済み）
    pub forward: Vector3<f32>,
    /// 最初の子のバインド時ローカル位置
    pub child_local_position: Option<Vector3<f32>>,
    /// 最初の子までのバインド長
    pub child_length: f32,
}

/// 駆動対象ボーンのバインド姿勢キャッシュ
///
/// 初回フレームで一度だけキャプチャされ、以降の解決の基準になる。
/// リグを差し替えたときは rebind で取り直す。
#[derive(Debug, Default)]
pub struct BindPoseCache {
    bindings: HashMap<BoneId, BoneBinding>,
}

impl BindPoseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn captured(&self, bone: BoneId) -> bool {
        self.bindings.contains_key(&bone)
    }

    pub fn get(&self, bone: BoneId) -> Option<&BoneBinding> {
        self.bindings.get(&bone)
    }

    /// ボーンのバインド姿勢をキャプチャする
    ///
    /// ref_forward / ref_right はロール基準のワールド方向（通常はカメラ軸）。
    /// flip_forward はリグ側の軸規約が反転しているボーン用。
    /// すでにキャプチャ済みなら何もしない。
    pub fn capture(
        &mut self,
        rig: &Rig,
        bone: BoneId,
        ref_forward: Vector3<f32>,
        ref_right: Vector3<f32>,
        flip_forward: bool,
    ) {
        if self.captured(bone) {
            return;
        }

        let parent_inv = match rig.parent(bone) {
            Some(p) => rig.world_rotation(p).inverse(),
            None => UnitQuaternion::identity(),
        };

        // 軸: 最初の子へ向かう方向。子がないボーンはY軸で代用。
        let child = rig.first_child(bone);
        let (aim_axis, child_local_position, child_length) = match child {
            Some(c) => {
                let world_aim = rig.world_position(c) - rig.world_position(bone);
                let local_pos = rig.node(c).local_position;
                let axis = parent_inv * world_aim;
                let len = local_pos.norm();
                if axis.norm_squared() < 1e-10 {
                    (Vector3::y(), Some(local_pos), len)
                } else {
                    (axis.normalize(), Some(local_pos), len)
                }
            }
            None => (Vector3::y(), None, 0.0),
        };

        // ロール基準: 参照前方を軸直交面へ射影。潰れたら参照右、
        // それも潰れたら定数前方へフォールバック。
        let fwd_parent = parent_inv * ref_forward;
        let mut forward = project_on_plane(fwd_parent, aim_axis);
        if forward.norm_squared() < 1e-6 {
            forward = project_on_plane(parent_inv * ref_right, aim_axis);
        }
        if forward.norm_squared() < 1e-6 {
            forward = Vector3::z();
        }
        let mut forward = forward.normalize();
        if flip_forward {
            forward = -forward;
        }

        self.bindings.insert(
            bone,
            BoneBinding {
                local_rotation: rig.node(bone).local_rotation,
                aim_axis,
                forward,
                child_local_position,
                child_length,
            },
        );
    }

    /// 全バインドを破棄する。次のキャプチャで取り直しになる。
    pub fn rebind(&mut self) {
        self.bindings.clear();
    }
}
