use nalgebra::{UnitQuaternion, Vector3};

use crate::config::ArmConfig;
use crate::math::{exp_follow, look_rotation, nlerp, nlerp_vec, project_on_plane};
use crate::rig::{BoneId, Rig};

use super::bind::BoneBinding;

/// 観測方向から腕ボーンのローカル回転を解く
///
/// 解決は全て親空間で行う。観測軸とロール基準から目標基底を作り、
/// バインド基底との差分をバインドローカル回転に乗せる。
/// ロールは観測から直接得られないので、基準前方の射影とバインドへの
/// 引き戻しで安定させる。
pub struct OrientationSolver {
    follow_rate: f32,
    freeze_roll_to_bind: bool,
    roll_freeze_weight: f32,
}

impl OrientationSolver {
    pub fn from_config(config: &ArmConfig) -> Self {
        Self {
            follow_rate: config.follow_rate,
            freeze_roll_to_bind: config.freeze_roll_to_bind,
            roll_freeze_weight: config.roll_freeze_weight,
        }
    }

    /// ボーンを観測ワールド方向へ向ける
    ///
    /// roll_ref_world はロール基準のワールド前方（通常はカメラ前方）。
    /// offset_euler_deg はボーンごとの定数補正（度）。
    /// 観測が退化している場合は何も適用せず false を返す。
    pub fn solve(
        &self,
        rig: &mut Rig,
        bone: BoneId,
        world_dir: Vector3<f32>,
        binding: &BoneBinding,
        roll_ref_world: Vector3<f32>,
        offset_euler_deg: [f32; 3],
        dt: f32,
    ) -> bool {
        let parent = match rig.parent(bone) {
            Some(p) => p,
            None => return false,
        };
        if world_dir.norm_squared() < 1e-6 {
            return false;
        }

        let parent_inv = rig.world_rotation(parent).inverse();

        let target_axis = parent_inv * world_dir.normalize();
        if target_axis.norm_squared() < 1e-6 {
            return false;
        }
        let target_axis = target_axis.normalize();

        // ロール基準前方を観測軸の直交面へ。潰れたらバインド前方で代用。
        let roll_ref = parent_inv * roll_ref_world;
        let mut target_forward = project_on_plane(roll_ref, target_axis);
        if target_forward.norm_squared() < 1e-6 {
            target_forward = binding.forward;
        }
        let mut target_forward = target_forward.normalize();

        if self.freeze_roll_to_bind {
            target_forward = nlerp_vec(target_forward, binding.forward, self.roll_freeze_weight);
        }

        let target_basis = match look_rotation(target_forward, target_axis) {
            Some(q) => q,
            None => return false,
        };
        let bind_basis = match look_rotation(binding.forward, binding.aim_axis) {
            Some(q) => q,
            None => return false,
        };

        let delta = target_basis * bind_basis.inverse();
        let offset = UnitQuaternion::from_euler_angles(
            offset_euler_deg[0].to_radians(),
            offset_euler_deg[1].to_radians(),
            offset_euler_deg[2].to_radians(),
        );
        let target_local = binding.local_rotation * delta * offset;

        let t = exp_follow(self.follow_rate, dt);
        let node = rig.node_mut(bone);
        node.local_rotation = nlerp(&node.local_rotation, &target_local, t);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ArmConfig;
    use crate::driver::bind::BindPoseCache;

    // 1フレームでほぼ収束するレート
    const FAST: f32 = 2000.0;
    const DT: f32 = 1.0 / 60.0;

    fn arm_rig() -> (Rig, BoneId) {
        let mut rig = Rig::new();
        let root = rig.add_bone("root", None, Vector3::zeros(), UnitQuaternion::identity());
        let upper = rig.add_bone(
            "upper",
            Some(root),
            Vector3::new(0.2, 1.4, 0.0),
            UnitQuaternion::identity(),
        );
        rig.add_bone(
            "lower",
            Some(upper),
            Vector3::new(0.3, 0.0, 0.0),
            UnitQuaternion::identity(),
        );
        (rig, upper)
    }

    fn solver(rate: f32) -> OrientationSolver {
        let config = ArmConfig {
            follow_rate: rate,
            ..ArmConfig::default()
        };
        OrientationSolver::from_config(&config)
    }

    #[test]
    fn test_bind_direction_is_fixed_point() {
        // バインド時と同じ観測 → ローカル回転はバインドのまま
        let (mut rig, upper) = arm_rig();
        let mut cache = BindPoseCache::new();
        cache.capture(&rig, upper, Vector3::z(), Vector3::x(), false);
        let binding = cache.get(upper).unwrap().clone();

        let applied = solver(FAST).solve(
            &mut rig,
            upper,
            Vector3::x(),
            &binding,
            Vector3::z(),
            [0.0; 3],
            DT,
        );
        assert!(applied);
        let rot = rig.node(upper).local_rotation;
        assert!(rot.angle_to(&binding.local_rotation) < 1e-3, "angle={}", rot.angle());
    }

    #[test]
    fn test_raised_arm_aims_child_up() {
        let (mut rig, upper) = arm_rig();
        let lower = rig.find("lower").unwrap();
        let mut cache = BindPoseCache::new();
        cache.capture(&rig, upper, Vector3::z(), Vector3::x(), false);
        let binding = cache.get(upper).unwrap().clone();

        // 腕を真上に
        solver(FAST).solve(
            &mut rig,
            upper,
            Vector3::y(),
            &binding,
            Vector3::z(),
            [0.0; 3],
            DT,
        );
        let aim = (rig.world_position(lower) - rig.world_position(upper)).normalize();
        assert!((aim - Vector3::y()).norm() < 1e-2, "aim={:?}", aim);
    }

    #[test]
    fn test_degenerate_direction_is_noop() {
        let (mut rig, upper) = arm_rig();
        let mut cache = BindPoseCache::new();
        cache.capture(&rig, upper, Vector3::z(), Vector3::x(), false);
        let binding = cache.get(upper).unwrap().clone();
        let before = rig.node(upper).local_rotation;

        let applied = solver(FAST).solve(
            &mut rig,
            upper,
            Vector3::zeros(),
            &binding,
            Vector3::z(),
            [0.0; 3],
            DT,
        );
        assert!(!applied);
        assert!(rig.node(upper).local_rotation.angle_to(&before) < 1e-6);
    }

    #[test]
    fn test_follow_rate_limits_step() {
        let (mut rig, upper) = arm_rig();
        let mut cache = BindPoseCache::new();
        cache.capture(&rig, upper, Vector3::z(), Vector3::x(), false);
        let binding = cache.get(upper).unwrap().clone();

        // 低レートでは1フレームで目標に届かない
        solver(5.0).solve(
            &mut rig,
            upper,
            Vector3::y(),
            &binding,
            Vector3::z(),
            [0.0; 3],
            DT,
        );
        let angle = rig.node(upper).local_rotation.angle();
        assert!(angle > 1e-3 && angle < std::f32::consts::FRAC_PI_2 * 0.5, "angle={}", angle);
    }

    #[test]
    fn test_euler_offset_rotates_result() {
        let (mut rig, upper) = arm_rig();
        let mut cache = BindPoseCache::new();
        cache.capture(&rig, upper, Vector3::z(), Vector3::x(), false);
        let binding = cache.get(upper).unwrap().clone();

        solver(FAST).solve(
            &mut rig,
            upper,
            Vector3::x(),
            &binding,
            Vector3::z(),
            [0.0, 0.0, 30.0],
            DT,
        );
        let angle = rig.node(upper).local_rotation.angle().to_degrees();
        assert!((angle - 30.0).abs() < 0.5, "angle={}", angle);
    }
}
