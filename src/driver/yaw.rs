use nalgebra::Vector3;

use crate::camera::CameraView;
use crate::config::YawConfig;
use crate::math::{delta_angle_deg, exp_follow, lerp_angle_deg};

/// 胴体ランドマークからカメラ相対ヨー角を推定・安定化する
///
/// 肩と腰の4点から胴体の右・上ベクトルを作り、その外積を前方として
/// 水平面に落としてヨー角にする。真横を向くと肩幅が潰れて前方の符号が
/// 暴れるため、ヒステリシス付きの凍結と符号連続性補正を挟む。
///
/// update は新しい安定化済みヨー角（度）を返す。凍結中や観測が退化して
/// いるフレームは None を返し、内部角は更新しない。呼び出し側は直近の
/// 角度を使い続ければよい。
pub struct YawStabilizer {
    config: YawConfig,
    frozen: bool,
    frozen_prev: bool,
    prev_forward_flat: Option<Vector3<f32>>,
    yaw_deg: Option<f32>,
}

impl YawStabilizer {
    pub fn from_config(config: &YawConfig) -> Self {
        Self {
            config: config.clone(),
            frozen: false,
            frozen_prev: false,
            prev_forward_flat: None,
            yaw_deg: None,
        }
    }

    /// 直近の安定化済みヨー角（度）
    pub fn last_yaw_deg(&self) -> Option<f32> {
        self.yaw_deg
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn reset(&mut self) {
        self.frozen = false;
        self.frozen_prev = false;
        self.prev_forward_flat = None;
        self.yaw_deg = None;
    }

    /// 肩・腰4点（正規化xy + 弱いz）からヨー角を更新する
    pub fn update(
        &mut self,
        camera: &CameraView,
        shoulders: (Vector3<f32>, Vector3<f32>),
        hips: (Vector3<f32>, Vector3<f32>),
        depth: f32,
        dt: f32,
    ) -> Option<f32> {
        let (ls, rs) = shoulders;
        let (lh, rh) = hips;

        let shoulder_width01 = (rs.xy() - ls.xy()).norm();
        if shoulder_width01 < 1e-4 {
            return None;
        }

        if self.config.freeze_when_narrow {
            if self.config.hysteresis {
                if !self.frozen && shoulder_width01 < self.config.freeze_in01 {
                    self.frozen = true;
                } else if self.frozen && shoulder_width01 > self.config.freeze_out01 {
                    self.frozen = false;
                }
            } else {
                self.frozen = shoulder_width01 < self.config.narrow_threshold01;
            }

            // 遷移時に履歴を捨てて、解凍後は新しい観測から入り直す
            if self.frozen && !self.frozen_prev {
                self.prev_forward_flat = None;
            } else if !self.frozen && self.frozen_prev {
                self.prev_forward_flat = None;
                self.yaw_deg = None;
            }
            self.frozen_prev = self.frozen;

            if self.frozen {
                return None;
            }
        }

        let cam_f = camera.forward();

        let lw0 = camera.project(ls.xy(), depth);
        let rw0 = camera.project(rs.xy(), depth);
        let lh0 = camera.project(lh.xy(), depth);
        let rh0 = camera.project(rh.xy(), depth);

        // 正規化座標→メートルの換算係数。弱いzの持ち上げに使う。
        let meters_per01 = (rw0 - lw0).norm() / shoulder_width01;

        let (lw, rw, lhw, rhw) = if self.config.use_landmark_z {
            let sign = if self.config.invert_z { -1.0 } else { 1.0 };
            let k = meters_per01 * self.config.z_to_meters * sign;
            (
                lw0 + cam_f * (ls.z * k),
                rw0 + cam_f * (rs.z * k),
                lh0 + cam_f * (lh.z * k),
                rh0 + cam_f * (rh.z * k),
            )
        } else {
            (lw0, rw0, lh0, rh0)
        };

        let shoulder_center = (lw + rw) * 0.5;
        let hip_center = (lhw + rhw) * 0.5;

        let right = rw - lw;
        let up = shoulder_center - hip_center;
        if right.norm_squared() < 1e-6 || up.norm_squared() < 1e-6 {
            return None;
        }
        let right = right.normalize();
        let up = up.normalize();

        let forward = right.cross(&up);
        if forward.norm_squared() < 1e-6 {
            return None;
        }

        let mut flat = Vector3::new(forward.x, 0.0, forward.z);
        if flat.norm_squared() < 1e-6 {
            return None;
        }
        flat = flat.normalize();

        // 真横付近では外積の符号が反転しやすい。前フレームと逆を向いたら
        // 反転として扱い、同じ側へ戻す。
        if self.config.continuity {
            if let Some(prev) = self.prev_forward_flat {
                if flat.dot(&prev) < 0.0 {
                    flat = -flat;
                }
            }
        }
        self.prev_forward_flat = Some(flat);

        let mut cam_fwd_flat = cam_f;
        let mut cam_right_flat = camera.right();
        cam_fwd_flat.y = 0.0;
        cam_right_flat.y = 0.0;
        if cam_fwd_flat.norm_squared() < 1e-6 || cam_right_flat.norm_squared() < 1e-6 {
            return None;
        }
        let cam_fwd_flat = cam_fwd_flat.normalize();
        let cam_right_flat = cam_right_flat.normalize();

        let x = flat.dot(&cam_right_flat);
        let z = flat.dot(&cam_fwd_flat);
        let yaw_raw = -x.atan2(z).to_degrees();

        // 初回（および解凍直後）は平滑化せずそのまま採用する
        let current = match self.yaw_deg {
            Some(v) => v,
            None => {
                self.yaw_deg = Some(yaw_raw);
                yaw_raw
            }
        };

        let blended = lerp_angle_deg(current, yaw_raw, exp_follow(self.config.follow_rate, dt));
        let max_step = self.config.max_deg_per_sec.max(1.0) * dt;
        let delta = delta_angle_deg(current, blended).clamp(-max_step, max_step);
        let next = current + delta;
        self.yaw_deg = Some(next);
        Some(next)
    }
}
