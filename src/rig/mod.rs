use nalgebra::{UnitQuaternion, Vector3};

/// リグ内ノードのハンドル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoneId(usize);

/// リグの1ノード
///
/// ローカル変換のみ保持し、ワールド変換は親をたどって評価する。
/// スケールは均一（ボディスケールがルートに乗るだけなので十分）。
#[derive(Debug, Clone)]
pub struct RigNode {
    pub name: String,
    pub parent: Option<BoneId>,
    pub local_position: Vector3<f32>,
    pub local_rotation: UnitQuaternion<f32>,
    pub local_scale: f32,
}

/// 最小限のボーン階層
///
/// ノードは追加順に保持される。親は必ず子より先に追加されていること。
#[derive(Debug, Clone, Default)]
pub struct Rig {
    nodes: Vec<RigNode>,
}

impl Rig {
    pub fn new() -> Self {
        Self::default()
    }

    /// ボーンを追加してハンドルを返す
    ///
    /// 親のハンドルは同じリグの add_bone が返したものであること。
    /// 未追加の親を指すとパニックする。
    pub fn add_bone(
        &mut self,
        name: &str,
        parent: Option<BoneId>,
        local_position: Vector3<f32>,
        local_rotation: UnitQuaternion<f32>,
    ) -> BoneId {
        if let Some(BoneId(p)) = parent {
            assert!(p < self.nodes.len(), "parent must be added first");
        }
        self.nodes.push(RigNode {
            name: name.to_string(),
            parent,
            local_position,
            local_rotation,
            local_scale: 1.0,
        });
        BoneId(self.nodes.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: BoneId) -> &RigNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: BoneId) -> &mut RigNode {
        &mut self.nodes[id.0]
    }

    pub fn find(&self, name: &str) -> Option<BoneId> {
        self.nodes.iter().position(|n| n.name == name).map(BoneId)
    }

    pub fn parent(&self, id: BoneId) -> Option<BoneId> {
        self.nodes[id.0].parent
    }

    /// 最初の子（ボーンの向き推定に使う「最寄りの子」）
    pub fn first_child(&self, id: BoneId) -> Option<BoneId> {
        self.nodes
            .iter()
            .position(|n| n.parent == Some(id))
            .map(BoneId)
    }

    pub fn world_rotation(&self, id: BoneId) -> UnitQuaternion<f32> {
        let node = &self.nodes[id.0];
        match node.parent {
            Some(p) => self.world_rotation(p) * node.local_rotation,
            None => node.local_rotation,
        }
    }

    pub fn world_scale(&self, id: BoneId) -> f32 {
        let node = &self.nodes[id.0];
        match node.parent {
            Some(p) => self.world_scale(p) * node.local_scale,
            None => node.local_scale,
        }
    }

    pub fn world_position(&self, id: BoneId) -> Vector3<f32> {
        let node = &self.nodes[id.0];
        match node.parent {
            Some(p) => {
                self.world_position(p)
                    + self.world_rotation(p) * (node.local_position * self.world_scale(p))
            }
            None => node.local_position,
        }
    }

    /// ワールド方向ベクトルをノードのローカル方向へ（スケール非依存）
    pub fn inverse_transform_direction(&self, id: BoneId, world_dir: Vector3<f32>) -> Vector3<f32> {
        self.world_rotation(id).inverse() * world_dir
    }

    /// ノードのローカル方向ベクトルをワールドへ
    pub fn transform_direction(&self, id: BoneId, local_dir: Vector3<f32>) -> Vector3<f32> {
        self.world_rotation(id) * local_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> (Rig, BoneId, BoneId, BoneId) {
        let mut rig = Rig::new();
        let root = rig.add_bone("root", None, Vector3::zeros(), UnitQuaternion::identity());
        let a = rig.add_bone(
            "a",
            Some(root),
            Vector3::new(0.0, 1.0, 0.0),
            UnitQuaternion::identity(),
        );
        let b = rig.add_bone(
            "b",
            Some(a),
            Vector3::new(0.0, 1.0, 0.0),
            UnitQuaternion::identity(),
        );
        (rig, root, a, b)
    }

    #[test]
    fn test_world_position_chain() {
        let (rig, _, _, b) = chain();
        let p = rig.world_position(b);
        assert!((p - Vector3::new(0.0, 2.0, 0.0)).norm() < 1e-6);
    }

    #[test]
    fn test_world_position_with_rotation() {
        let (mut rig, root, _, b) = chain();
        // ルートをZ軸まわりに90°回すと、子のYオフセットは-X方向へ
        rig.node_mut(root).local_rotation =
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f32::consts::FRAC_PI_2);
        let p = rig.world_position(b);
        assert!((p - Vector3::new(-2.0, 0.0, 0.0)).norm() < 1e-5, "p={:?}", p);
    }

    #[test]
    fn test_world_position_with_scale() {
        let (mut rig, root, _, b) = chain();
        rig.node_mut(root).local_scale = 2.0;
        let p = rig.world_position(b);
        assert!((p - Vector3::new(0.0, 4.0, 0.0)).norm() < 1e-5);
    }

    #[test]
    fn test_find_and_children() {
        let (rig, root, a, _) = chain();
        assert_eq!(rig.find("a"), Some(a));
        assert_eq!(rig.find("missing"), None);
        assert_eq!(rig.first_child(root), Some(a));
        assert_eq!(rig.parent(a), Some(root));
    }

    #[test]
    #[should_panic(expected = "parent must be added first")]
    fn test_add_bone_rejects_unknown_parent() {
        let mut rig = Rig::new();
        rig.add_bone(
            "orphan",
            Some(BoneId(5)),
            Vector3::zeros(),
            UnitQuaternion::identity(),
        );
    }

    #[test]
    fn test_inverse_transform_direction() {
        let (mut rig, root, a, _) = chain();
        rig.node_mut(root).local_rotation =
            UnitQuaternion::from_axis_angle(&Vector3::y_axis(), std::f32::consts::FRAC_PI_2);
        let local = rig.inverse_transform_direction(a, Vector3::x());
        let back = rig.transform_direction(a, local);
        assert!((back - Vector3::x()).norm() < 1e-5);
    }
}
