pub mod apply;
pub mod bind;
pub mod depth;
pub mod length;
pub mod orient;
pub mod scale;
pub mod yaw;

pub use apply::RigApplier;
pub use bind::{BindPoseCache, BoneBinding};
pub use depth::DepthEstimator;
pub use length::LengthFitter;
pub use orient::OrientationSolver;
pub use scale::ScaleEstimator;
pub use yaw::YawStabilizer;

use anyhow::{Context, Result};
use nalgebra::{UnitQuaternion, Vector3};

use crate::body_scale::BodyScaleProvider;
use crate::camera::CameraView;
use crate::config::DriverConfig;
use crate::landmark::{LandmarkFrame, PoseSource, Side};
use crate::math::{exp_follow, nlerp, project_on_plane};
use crate::rig::{BoneId, Rig};

/// ドライバが駆動するボーンの割り当て
#[derive(Debug, Clone, Copy)]
pub struct DriverBones {
    pub root: BoneId,
    pub pivot: BoneId,
    pub left_arm: BoneId,
    pub left_fore_arm: BoneId,
    pub left_hand: BoneId,
    pub right_arm: BoneId,
    pub right_fore_arm: BoneId,
    pub right_hand: BoneId,
}

impl DriverBones {
    /// 規約名でリグからボーンを引く
    pub fn resolve(rig: &Rig) -> Result<Self> {
        let find = |name: &str| {
            rig.find(name)
                .with_context(|| format!("bone not found in rig: {name}"))
        };
        Ok(Self {
            root: find("root")?,
            pivot: find("pivot")?,
            left_arm: find("left_arm")?,
            left_fore_arm: find("left_fore_arm")?,
            left_hand: find("left_hand")?,
            right_arm: find("right_arm")?,
            right_fore_arm: find("right_fore_arm")?,
            right_hand: find("right_hand")?,
        })
    }
}

/// ランドマークフレームからリグ全体を駆動する本体
///
/// 1フレームの流れ:
///   深度推定 → ルート位置 → スケール → ピボットヨー → 腕の向き
///   → 腕長フィット → 手の安定化 → 平滑化して適用
/// 新しいフレームが無い間も適用段だけは毎フレーム回り、
/// 直近の目標へ収束し続ける。
pub struct RigDriver {
    config: DriverConfig,
    camera: CameraView,
    bones: DriverBones,
    depth: DepthEstimator,
    yaw: YawStabilizer,
    scale: ScaleEstimator,
    orient: OrientationSolver,
    length: LengthFitter,
    applier: RigApplier,
    bind: BindPoseCache,
    pivot_base_local: Option<UnitQuaternion<f32>>,
    last_frame_id: u64,
}

impl RigDriver {
    pub fn new(config: &DriverConfig, camera: CameraView, bones: DriverBones) -> Self {
        Self {
            config: config.clone(),
            camera,
            bones,
            depth: DepthEstimator::from_config(&config.depth),
            yaw: YawStabilizer::from_config(&config.yaw),
            scale: ScaleEstimator::from_config(&config.scale),
            orient: OrientationSolver::from_config(&config.arms),
            length: LengthFitter::from_config(&config.length),
            applier: RigApplier::from_config(&config.apply),
            bind: BindPoseCache::new(),
            pivot_base_local: None,
            last_frame_id: 0,
        }
    }

    pub fn camera(&self) -> &CameraView {
        &self.camera
    }

    /// 直近の深度推定（メートル）
    pub fn last_depth(&self) -> Option<f32> {
        self.depth.last()
    }

    /// 直近の安定化済みヨー角（度）
    pub fn last_yaw_deg(&self) -> Option<f32> {
        self.yaw.last_yaw_deg()
    }

    /// スケールを現在値で固定する
    pub fn lock_scale_now(&mut self) {
        self.scale.lock_now();
    }

    pub fn unlock_scale(&mut self) {
        self.scale.unlock();
    }

    /// 追跡状態を捨てる。バインド姿勢は保持する。
    pub fn reset_tracking(&mut self) {
        self.depth.reset();
        self.yaw.reset();
        self.scale.reset();
        self.applier.reset();
    }

    /// バインド姿勢を破棄し、次の有効フレームで取り直す
    pub fn rebind(&mut self) {
        self.bind.rebind();
        self.pivot_base_local = None;
    }

    /// 共有ソースから1フレーム分進める
    ///
    /// フレームIDが前回と同じなら目標は更新せず、適用段だけ回す。
    /// 同じスナップショットを暗黙に再解釈することはない。
    pub fn update(
        &mut self,
        rig: &mut Rig,
        source: &PoseSource,
        body_scale: &dyn BodyScaleProvider,
        dt: f32,
    ) {
        let id = source.frame_id();
        if id != self.last_frame_id {
            self.last_frame_id = id;
            if let Some(frame) = source.snapshot() {
                self.refresh_targets(rig, &frame, body_scale, dt);
            }
        }
        self.applier
            .apply(rig, self.bones.root, self.bones.pivot, dt);
    }

    /// フレームを直接与えて1フレーム分進める
    pub fn update_frame(
        &mut self,
        rig: &mut Rig,
        frame: &LandmarkFrame,
        body_scale: &dyn BodyScaleProvider,
        dt: f32,
    ) {
        self.refresh_targets(rig, frame, body_scale, dt);
        self.applier
            .apply(rig, self.bones.root, self.bones.pivot, dt);
    }

    fn ensure_bind(&mut self, rig: &Rig) {
        if self.pivot_base_local.is_none() {
            self.pivot_base_local = Some(rig.node(self.bones.pivot).local_rotation);
        }

        let fwd = self.roll_ref_world(rig);
        let right = self.camera.right();
        let arms = &self.config.arms;
        self.bind.capture(
            rig,
            self.bones.left_arm,
            fwd,
            right,
            arms.flip_left_bind_forward,
        );
        self.bind.capture(
            rig,
            self.bones.left_fore_arm,
            fwd,
            right,
            arms.flip_left_fore_bind_forward,
        );
        self.bind
            .capture(rig, self.bones.left_hand, fwd, right, false);
        self.bind
            .capture(rig, self.bones.right_arm, fwd, right, false);
        self.bind
            .capture(rig, self.bones.right_fore_arm, fwd, right, false);
        self.bind
            .capture(rig, self.bones.right_hand, fwd, right, false);
    }

    fn roll_ref_world(&self, rig: &Rig) -> Vector3<f32> {
        if self.config.arms.camera_forward_roll_ref {
            self.camera.forward()
        } else {
            rig.transform_direction(self.bones.root, Vector3::z())
        }
    }

    /// 新しいフレームから各段の目標を更新する
    fn refresh_targets(
        &mut self,
        rig: &mut Rig,
        frame: &LandmarkFrame,
        body_scale: &dyn BodyScaleProvider,
        dt: f32,
    ) {
        let (ls, rs) = match frame.shoulders() {
            Some(v) => v,
            None => return,
        };
        let width01 = (rs - ls).norm();

        let depth = match self.depth.estimate(width01, dt).or(self.depth.last()) {
            Some(d) => d,
            None => return,
        };

        self.ensure_bind(rig);

        let lw = self.camera.project(ls, depth);
        let rw = self.camera.project(rs, depth);
        let mid_shoulder = (lw + rw) * 0.5;
        let mid_hip = frame.hips().map(|(lh, rh)| {
            (self.camera.project(lh, depth) + self.camera.project(rh, depth)) * 0.5
        });

        if self.config.root.drive_root {
            let anchor = if self.config.root.anchor_to_hips {
                mid_hip.unwrap_or(mid_shoulder)
            } else {
                mid_shoulder
            };
            let offset = Vector3::from(self.config.root.pos_offset);
            let mut target = anchor + offset;
            target.y += self.config.root.anchor_y_offset;
            self.applier.set_position_target(target);
        }

        let shoulder_width_world = (rw - lw).norm();
        if let Some(s) =
            self.scale
                .update(shoulder_width_world, width01, body_scale.body_scale())
        {
            self.applier.set_scale_target(s);
        }

        if self.config.yaw.enabled {
            if let (Some(sz), Some(hz)) = (frame.shoulders_z(), frame.hips_z()) {
                if let Some(yaw_deg) = self.yaw.update(&self.camera, sz, hz, depth, dt) {
                    if let Some(base) = self.pivot_base_local {
                        let spin = UnitQuaternion::from_axis_angle(
                            &Vector3::y_axis(),
                            yaw_deg.to_radians(),
                        );
                        self.applier.set_pivot_rotation_target(base * spin);
                    }
                }
            }
        }

        self.drive_arm(rig, frame, Side::Left, depth, dt);
        self.drive_arm(rig, frame, Side::Right, depth, dt);
    }

    fn drive_arm(&mut self, rig: &mut Rig, frame: &LandmarkFrame, side: Side, depth: f32, dt: f32) {
        let (s01, e01, w01) = match frame.arm(side) {
            Some(v) => v,
            None => return,
        };
        let s = self.camera.project(s01, depth);
        let e = self.camera.project(e01, depth);
        let w = self.camera.project(w01, depth);

        let mut upper_dir = e - s;
        let mut lower_dir = w - e;
        if self.config.arms.project_to_camera_plane {
            let cam_f = self.camera.forward();
            upper_dir = project_on_plane(upper_dir, cam_f);
            lower_dir = project_on_plane(lower_dir, cam_f);
        }

        let (arm, fore, hand, arm_offset, fore_offset) = match side {
            Side::Left => (
                self.bones.left_arm,
                self.bones.left_fore_arm,
                self.bones.left_hand,
                self.config.arms.left_arm_offset_euler,
                self.config.arms.left_fore_arm_offset_euler,
            ),
            Side::Right => (
                self.bones.right_arm,
                self.bones.right_fore_arm,
                self.bones.right_hand,
                self.config.arms.right_arm_offset_euler,
                self.config.arms.right_fore_arm_offset_euler,
            ),
        };

        let roll_ref = self.roll_ref_world(rig);
        if let Some(binding) = self.bind.get(arm) {
            self.orient
                .solve(rig, arm, upper_dir, binding, roll_ref, arm_offset, dt);
        }
        if let Some(binding) = self.bind.get(fore) {
            self.orient
                .solve(rig, fore, lower_dir, binding, roll_ref, fore_offset, dt);
        }

        // バインド長が退化したセグメントは長さフィットの対象外
        let fore_bind_local = self
            .bind
            .get(arm)
            .filter(|b| b.child_length > 1e-4)
            .and_then(|b| b.child_local_position);
        let hand_bind_local = self
            .bind
            .get(fore)
            .filter(|b| b.child_length > 1e-4)
            .and_then(|b| b.child_local_position);
        if let (Some(fb), Some(hb)) = (fore_bind_local, hand_bind_local) {
            self.length.fit(rig, arm, fore, hand, s, e, w, fb, hb, dt);
        }

        if self.config.arms.stabilize_hands {
            if let Some(binding) = self.bind.get(hand) {
                let t = exp_follow(self.config.arms.hand_follow_rate, dt);
                let node = rig.node_mut(hand);
                node.local_rotation = nlerp(&node.local_rotation, &binding.local_rotation, t);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::{Landmark, LandmarkIndex, PoseSource};

    const DT: f32 = 1.0 / 60.0;

    fn test_rig() -> (Rig, DriverBones) {
        let mut rig = Rig::new();
        let root = rig.add_bone("root", None, Vector3::zeros(), UnitQuaternion::identity());
        let pivot = rig.add_bone(
            "pivot",
            Some(root),
            Vector3::zeros(),
            UnitQuaternion::identity(),
        );
        let left_arm = rig.add_bone(
            "left_arm",
            Some(pivot),
            Vector3::new(-0.2, 1.4, 0.0),
            UnitQuaternion::identity(),
        );
        let left_fore_arm = rig.add_bone(
            "left_fore_arm",
            Some(left_arm),
            Vector3::new(-0.3, 0.0, 0.0),
            UnitQuaternion::identity(),
        );
        let left_hand = rig.add_bone(
            "left_hand",
            Some(left_fore_arm),
            Vector3::new(-0.25, 0.0, 0.0),
            UnitQuaternion::identity(),
        );
        let right_arm = rig.add_bone(
            "right_arm",
            Some(pivot),
            Vector3::new(0.2, 1.4, 0.0),
            UnitQuaternion::identity(),
        );
        let right_fore_arm = rig.add_bone(
            "right_fore_arm",
            Some(right_arm),
            Vector3::new(0.3, 0.0, 0.0),
            UnitQuaternion::identity(),
        );
        let right_hand = rig.add_bone(
            "right_hand",
            Some(right_fore_arm),
            Vector3::new(0.25, 0.0, 0.0),
            UnitQuaternion::identity(),
        );
        let bones = DriverBones {
            root,
            pivot,
            left_arm,
            left_fore_arm,
            left_hand,
            right_arm,
            right_fore_arm,
            right_hand,
        };
        (rig, bones)
    }

    fn camera() -> CameraView {
        CameraView::new(60.0, 16.0 / 9.0)
    }

    // 正面向きで両腕を下げたポーズ。肩幅は正規化座標で0.2。
    fn facing_frame() -> LandmarkFrame {
        let mut arr = [Landmark::default(); LandmarkIndex::COUNT];
        let set = |arr: &mut [Landmark; LandmarkIndex::COUNT], i: LandmarkIndex, x: f32, y: f32| {
            arr[i as usize] = Landmark::new(x, y, 0.0);
        };
        set(&mut arr, LandmarkIndex::LeftShoulder, 0.4, 0.4);
        set(&mut arr, LandmarkIndex::RightShoulder, 0.6, 0.4);
        set(&mut arr, LandmarkIndex::LeftElbow, 0.4, 0.52);
        set(&mut arr, LandmarkIndex::RightElbow, 0.6, 0.52);
        set(&mut arr, LandmarkIndex::LeftWrist, 0.4, 0.64);
        set(&mut arr, LandmarkIndex::RightWrist, 0.6, 0.64);
        set(&mut arr, LandmarkIndex::LeftHip, 0.43, 0.62);
        set(&mut arr, LandmarkIndex::RightHip, 0.57, 0.62);
        LandmarkFrame::new(arr)
    }

    fn empty_frame() -> LandmarkFrame {
        LandmarkFrame::new([Landmark::default(); LandmarkIndex::COUNT])
    }

    fn driver(bones: DriverBones) -> RigDriver {
        RigDriver::new(&DriverConfig::default(), camera(), bones)
    }

    #[test]
    fn test_resolve_bones_by_name() {
        let (rig, bones) = test_rig();
        let resolved = DriverBones::resolve(&rig).unwrap();
        assert_eq!(resolved.left_hand, bones.left_hand);

        let empty = Rig::new();
        assert!(DriverBones::resolve(&empty).is_err());
    }

    #[test]
    fn test_depth_from_shoulder_width() {
        let (mut rig, bones) = test_rig();
        let mut drv = driver(bones);
        drv.update_frame(&mut rig, &facing_frame(), &1.0f32, DT);
        // 幅0.2 → 2.2 * 0.25 / 0.2 = 2.75m
        let d = drv.last_depth().unwrap();
        assert!((d - 2.75).abs() < 1e-4, "depth={}", d);
    }

    #[test]
    fn test_root_converges_to_hip_anchor() {
        let (mut rig, bones) = test_rig();
        let mut drv = driver(bones);
        let frame = facing_frame();
        for _ in 0..600 {
            drv.update_frame(&mut rig, &frame, &1.0f32, DT);
        }
        let depth = drv.last_depth().unwrap();
        let cam = camera();
        let expected = (cam.project(nalgebra::Vector2::new(0.43, 0.62), depth)
            + cam.project(nalgebra::Vector2::new(0.57, 0.62), depth))
            * 0.5;
        let root_pos = rig.node(bones.root).local_position;
        assert!(
            (root_pos - expected).norm() < 5e-2,
            "root={:?} expected={:?}",
            root_pos,
            expected
        );
    }

    #[test]
    fn test_arms_follow_observed_direction() {
        let (mut rig, bones) = test_rig();
        let mut drv = driver(bones);
        let frame = facing_frame();
        for _ in 0..600 {
            drv.update_frame(&mut rig, &frame, &1.0f32, DT);
        }
        // 観測では肘が肩の真下 → 上腕のワールド方向は下向き
        for (arm, fore) in [
            (bones.left_arm, bones.left_fore_arm),
            (bones.right_arm, bones.right_fore_arm),
        ] {
            let aim = (rig.world_position(fore) - rig.world_position(arm)).normalize();
            assert!(aim.y < -0.95, "aim={:?}", aim);
        }
    }

    #[test]
    fn test_empty_frame_holds_targets() {
        let (mut rig, bones) = test_rig();
        let mut drv = driver(bones);
        let frame = facing_frame();
        for _ in 0..60 {
            drv.update_frame(&mut rig, &frame, &1.0f32, DT);
        }
        let depth_before = drv.last_depth().unwrap();
        let pos_before = rig.node(bones.root).local_position;

        // ランドマーク無しのフレームでも破綻せず、直近の目標へ動き続ける
        for _ in 0..60 {
            drv.update_frame(&mut rig, &empty_frame(), &1.0f32, DT);
        }
        assert_eq!(drv.last_depth(), Some(depth_before));
        let pos_after = rig.node(bones.root).local_position;
        assert!(pos_after.iter().all(|v| v.is_finite()));
        // 目標は保持されているので巻き戻らない
        assert!((pos_after - pos_before).norm() < 0.5);
    }

    #[test]
    fn test_shared_source_skips_stale_frames() {
        let (mut rig, bones) = test_rig();
        let mut drv = driver(bones);
        let source = PoseSource::new();
        let publisher = source.publisher();

        // 発行前は何も起きない
        drv.update(&mut rig, &source, &1.0f32, DT);
        assert!(drv.last_depth().is_none());

        publisher.publish(facing_frame());
        drv.update(&mut rig, &source, &1.0f32, DT);
        assert!(drv.last_depth().is_some());

        // 新フレームが無い間も適用は進む
        let before = rig.node(bones.root).local_position;
        drv.update(&mut rig, &source, &1.0f32, DT);
        let after = rig.node(bones.root).local_position;
        assert!((after - before).norm() > 1e-6);
    }

    #[test]
    fn test_scale_lock_and_unlock() {
        let (mut rig, bones) = test_rig();
        let mut drv = driver(bones);
        let frame = facing_frame();
        for _ in 0..300 {
            drv.update_frame(&mut rig, &frame, &1.0f32, DT);
        }
        let locked_scale = rig.node(bones.root).local_scale;
        drv.lock_scale_now();

        // 体格係数を大きくしてもロック中はスケールが動かない
        for _ in 0..300 {
            drv.update_frame(&mut rig, &frame, &2.0f32, DT);
        }
        assert!((rig.node(bones.root).local_scale - locked_scale).abs() < 1e-2);

        drv.unlock_scale();
        for _ in 0..600 {
            drv.update_frame(&mut rig, &frame, &2.0f32, DT);
        }
        assert!(rig.node(bones.root).local_scale > locked_scale * 1.5);
    }

    #[test]
    fn test_reset_tracking_clears_filters() {
        let (mut rig, bones) = test_rig();
        let mut drv = driver(bones);
        drv.update_frame(&mut rig, &facing_frame(), &1.0f32, DT);
        assert!(drv.last_depth().is_some());
        drv.reset_tracking();
        assert!(drv.last_depth().is_none());
        assert!(drv.last_yaw_deg().is_none());
    }

    #[test]
    fn test_yaw_drives_pivot_rotation() {
        let (mut rig, bones) = test_rig();
        let mut drv = driver(bones);
        // 左肩が奥 → ヨーが出る
        let mut arr = [Landmark::default(); LandmarkIndex::COUNT];
        arr[LandmarkIndex::LeftShoulder as usize] = Landmark::new(0.42, 0.4, 0.35);
        arr[LandmarkIndex::RightShoulder as usize] = Landmark::new(0.58, 0.4, -0.35);
        arr[LandmarkIndex::LeftHip as usize] = Landmark::new(0.44, 0.62, 0.25);
        arr[LandmarkIndex::RightHip as usize] = Landmark::new(0.56, 0.62, -0.25);
        let frame = LandmarkFrame::new(arr);
        for _ in 0..600 {
            drv.update_frame(&mut rig, &frame, &1.0f32, DT);
        }
        let yaw = drv.last_yaw_deg().unwrap();
        assert!(yaw.abs() > 5.0, "yaw={}", yaw);
        let pivot_angle = rig.node(bones.pivot).local_rotation.angle().to_degrees();
        assert!((pivot_angle - yaw.abs()).abs() < 2.0, "pivot={} yaw={}", pivot_angle, yaw);
    }

    #[test]
    fn test_zero_length_segment_skips_length_fit() {
        // 手が前腕の原点に重なった退化リグ
        let mut rig = Rig::new();
        let root = rig.add_bone("root", None, Vector3::zeros(), UnitQuaternion::identity());
        let pivot = rig.add_bone(
            "pivot",
            Some(root),
            Vector3::zeros(),
            UnitQuaternion::identity(),
        );
        let left_arm = rig.add_bone(
            "left_arm",
            Some(pivot),
            Vector3::new(-0.2, 1.4, 0.0),
            UnitQuaternion::identity(),
        );
        let left_fore_arm = rig.add_bone(
            "left_fore_arm",
            Some(left_arm),
            Vector3::new(-0.3, 0.0, 0.0),
            UnitQuaternion::identity(),
        );
        let left_hand = rig.add_bone(
            "left_hand",
            Some(left_fore_arm),
            Vector3::zeros(),
            UnitQuaternion::identity(),
        );
        let right_arm = rig.add_bone(
            "right_arm",
            Some(pivot),
            Vector3::new(0.2, 1.4, 0.0),
            UnitQuaternion::identity(),
        );
        let right_fore_arm = rig.add_bone(
            "right_fore_arm",
            Some(right_arm),
            Vector3::new(0.3, 0.0, 0.0),
            UnitQuaternion::identity(),
        );
        let right_hand = rig.add_bone(
            "right_hand",
            Some(right_fore_arm),
            Vector3::new(0.25, 0.0, 0.0),
            UnitQuaternion::identity(),
        );
        let bones = DriverBones {
            root,
            pivot,
            left_arm,
            left_fore_arm,
            left_hand,
            right_arm,
            right_fore_arm,
            right_hand,
        };
        let mut drv = driver(bones);
        let frame = facing_frame();
        for _ in 0..120 {
            drv.update_frame(&mut rig, &frame, &1.0f32, DT);
        }
        // 退化した左腕は長さフィットされず、バインド時の長さが保たれる
        let fore_pos = rig.node(left_fore_arm).local_position;
        assert!((fore_pos.norm() - 0.3).abs() < 1e-6, "fore={:?}", fore_pos);
        assert!(rig.node(left_hand).local_position.norm() < 1e-6);
        assert!(fore_pos.iter().all(|v| v.is_finite()));
    }
}
