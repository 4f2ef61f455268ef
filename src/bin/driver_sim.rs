use anyhow::Result;
use std::thread;
use std::time::Duration;

use nalgebra::{UnitQuaternion, Vector3};

use mirrorfit::body_scale::WidthBodyScale;
use mirrorfit::camera::CameraView;
use mirrorfit::config::Config;
use mirrorfit::driver::{DriverBones, RigDriver};
use mirrorfit::landmark::{Landmark, LandmarkFrame, LandmarkIndex, PoseSource};
use mirrorfit::rig::Rig;

const CONFIG_PATH: &str = "config.toml";
const SIM_SECONDS: f32 = 5.0;
const PUBLISH_HZ: f32 = 30.0;
const DRIVE_HZ: f32 = 60.0;

fn main() -> Result<()> {
    env_logger::init();
    let config = Config::load_or_default(CONFIG_PATH);

    println!("Driver Sim - synthetic landmark stream");
    println!(
        "Depth: base={}m ref_width={} range=[{}, {}]",
        config.driver.depth.base_depth_m,
        config.driver.depth.ref_width01,
        config.driver.depth.min_m,
        config.driver.depth.max_m
    );
    println!(
        "Yaw: follow={}deg/s freeze=[{}, {}]",
        config.driver.yaw.max_deg_per_sec,
        config.driver.yaw.freeze_in01,
        config.driver.yaw.freeze_out01
    );
    println!();

    let mut rig = build_rig();
    let bones = DriverBones::resolve(&rig)?;
    let camera = CameraView::new(60.0, 16.0 / 9.0);

    let mut driver = RigDriver::new(&config.driver, camera.clone(), bones);
    let mut body_scale = WidthBodyScale::from_config(&config.body_scale, &config.driver.depth);

    let source = PoseSource::new();
    let publisher = source.publisher();

    // 推論スレッドの代わりに合成ランドマークを発行する
    let producer = thread::spawn(move || {
        let frames = (SIM_SECONDS * PUBLISH_HZ) as usize;
        for i in 0..frames {
            let t = i as f32 / PUBLISH_HZ;
            publisher.publish(synthetic_frame(t));
            thread::sleep(Duration::from_secs_f32(1.0 / PUBLISH_HZ));
        }
    });

    let dt = 1.0 / DRIVE_HZ;
    let steps = (SIM_SECONDS * DRIVE_HZ) as usize;
    for step in 0..steps {
        if let Some(frame) = source.snapshot() {
            body_scale.update(&camera, &frame, dt);
        }
        driver.update(&mut rig, &source, &body_scale, dt);

        if step % 30 == 0 {
            let root = rig.node(bones.root);
            println!(
                "t={:4.2}s depth={:?} yaw={:?} scale={:.3} root=({:.2}, {:.2}, {:.2})",
                step as f32 * dt,
                driver.last_depth(),
                driver.last_yaw_deg(),
                root.local_scale,
                root.local_position.x,
                root.local_position.y,
                root.local_position.z,
            );
        }
        thread::sleep(Duration::from_secs_f32(dt));
    }

    producer.join().expect("producer thread panicked");
    println!("done");
    Ok(())
}

/// 規約名つきの最小リグ（胴体ピボット + 両腕3ボーン）
fn build_rig() -> Rig {
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
    let left_fore = rig.add_bone(
        "left_fore_arm",
        Some(left_arm),
        Vector3::new(-0.3, 0.0, 0.0),
        UnitQuaternion::identity(),
    );
    rig.add_bone(
        "left_hand",
        Some(left_fore),
        Vector3::new(-0.25, 0.0, 0.0),
        UnitQuaternion::identity(),
    );
    let right_arm = rig.add_bone(
        "right_arm",
        Some(pivot),
        Vector3::new(0.2, 1.4, 0.0),
        UnitQuaternion::identity(),
    );
    let right_fore = rig.add_bone(
        "right_fore_arm",
        Some(right_arm),
        Vector3::new(0.3, 0.0, 0.0),
        UnitQuaternion::identity(),
    );
    rig.add_bone(
        "right_hand",
        Some(right_fore),
        Vector3::new(0.25, 0.0, 0.0),
        UnitQuaternion::identity(),
    );
    rig
}

/// ゆっくり揺れながら体を回す人物の合成フレーム
fn synthetic_frame(t: f32) -> LandmarkFrame {
    let sway = 0.04 * (0.8 * t).sin();
    let spin = (0.5 * t).sin();
    let arm_swing = 0.06 * (1.5 * t).sin();

    let cx = 0.5 + sway;
    let half_w = 0.1;
    let z = 0.35 * spin;

    let mut arr = [Landmark::default(); LandmarkIndex::COUNT];
    let mut set = |i: LandmarkIndex, x: f32, y: f32, z: f32| {
        arr[i as usize] = Landmark::new(x, y, z);
    };

    set(LandmarkIndex::LeftShoulder, cx - half_w, 0.38, z);
    set(LandmarkIndex::RightShoulder, cx + half_w, 0.38, -z);
    set(LandmarkIndex::LeftHip, cx - half_w * 0.7, 0.62, z * 0.7);
    set(LandmarkIndex::RightHip, cx + half_w * 0.7, 0.62, -z * 0.7);

    set(LandmarkIndex::LeftElbow, cx - half_w - arm_swing, 0.5, 0.0);
    set(LandmarkIndex::LeftWrist, cx - half_w - arm_swing * 2.0, 0.62, 0.0);
    set(LandmarkIndex::RightElbow, cx + half_w + arm_swing, 0.5, 0.0);
    set(LandmarkIndex::RightWrist, cx + half_w + arm_swing * 2.0, 0.62, 0.0);

    LandmarkFrame::new(arr)
}
