use anyhow::{bail, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    #[serde(default)]
    pub driver: DriverConfig,
    #[serde(default)]
    pub body_scale: BodyScaleConfig,
}

/// リターゲットドライバの全チューニング値
///
/// 構築時に固定され、フレームごとには変化しない。
/// 追従レートはすべて毎秒単位で、適用時に 1 - e^(-rate*dt) に変換される。
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DriverConfig {
    #[serde(default)]
    pub depth: DepthConfig,
    #[serde(default)]
    pub yaw: YawConfig,
    #[serde(default)]
    pub scale: ScaleConfig,
    #[serde(default)]
    pub arms: ArmConfig,
    #[serde(default)]
    pub length: LengthConfig,
    #[serde(default)]
    pub apply: ApplyConfig,
    #[serde(default)]
    pub root: RootConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DepthConfig {
    /// 肩幅が基準幅のときのカメラ距離（メートル）
    #[serde(default = "default_base_depth_m")]
    pub base_depth_m: f32,
    /// 正規化座標での基準肩幅
    #[serde(default = "default_ref_width01")]
    pub ref_width01: f32,
    #[serde(default = "default_depth_min")]
    pub min_m: f32,
    #[serde(default = "default_depth_max")]
    pub max_m: f32,
    /// 指数追従レート（毎秒）。0で平滑化なし。
    #[serde(default)]
    pub follow_rate: f32,
    /// 1秒あたりの最大変化量（メートル）。平滑化有効時のみ。
    #[serde(default = "default_depth_max_step")]
    pub max_step_per_sec: f32,
}

fn default_base_depth_m() -> f32 { 2.2 }
fn default_ref_width01() -> f32 { 0.25 }
fn default_depth_min() -> f32 { 1.2 }
fn default_depth_max() -> f32 { 4.0 }
fn default_depth_max_step() -> f32 { 2.0 }

impl Default for DepthConfig {
    fn default() -> Self {
        Self {
            base_depth_m: default_base_depth_m(),
            ref_width01: default_ref_width01(),
            min_m: default_depth_min(),
            max_m: default_depth_max(),
            follow_rate: 0.0,
            max_step_per_sec: default_depth_max_step(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct YawConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// ヨー角の追従レート（毎秒）
    #[serde(default = "default_yaw_follow_rate")]
    pub follow_rate: f32,
    /// ヨー角の変化速度上限（度/秒）
    #[serde(default = "default_max_yaw_speed")]
    pub max_deg_per_sec: f32,
    /// 符号反転による180°ジャンプの連続性補正
    #[serde(default = "default_true")]
    pub continuity: bool,
    /// 肩幅が狭いときヨー更新を凍結する
    #[serde(default = "default_true")]
    pub freeze_when_narrow: bool,
    /// ヒステリシスを使う（falseなら単一閾値）
    #[serde(default = "default_true")]
    pub hysteresis: bool,
    /// 凍結に入る肩幅閾値（正規化座標）
    #[serde(default = "default_freeze_in")]
    pub freeze_in01: f32,
    /// 凍結から出る肩幅閾値。freeze_in01 より大きいこと。
    #[serde(default = "default_freeze_out")]
    pub freeze_out01: f32,
    /// ヒステリシス無効時の単一閾値
    #[serde(default = "default_freeze_in")]
    pub narrow_threshold01: f32,
    /// ランドマークの弱いzで胴体平面を起こす
    #[serde(default = "default_true")]
    pub use_landmark_z: bool,
    /// 弱いz（無次元）→メートル換算係数
    #[serde(default = "default_z_to_meters")]
    pub z_to_meters: f32,
    #[serde(default = "default_true")]
    pub invert_z: bool,
}

fn default_true() -> bool { true }
fn default_yaw_follow_rate() -> f32 { 13.0 }
fn default_max_yaw_speed() -> f32 { 160.0 }
fn default_freeze_in() -> f32 { 0.06 }
fn default_freeze_out() -> f32 { 0.10 }
fn default_z_to_meters() -> f32 { 0.35 }

impl Default for YawConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            follow_rate: default_yaw_follow_rate(),
            max_deg_per_sec: default_max_yaw_speed(),
            continuity: true,
            freeze_when_narrow: true,
            hysteresis: true,
            freeze_in01: default_freeze_in(),
            freeze_out01: default_freeze_out(),
            narrow_threshold01: default_freeze_in(),
            use_landmark_z: true,
            z_to_meters: default_z_to_meters(),
            invert_z: true,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScaleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_one")]
    pub multiplier: f32,
    /// 外部ボディスケール係数の影響度 (0=無視, 1=全適用)
    #[serde(default = "default_one")]
    pub body_scale_influence: f32,
    /// ベースラインモード。falseで幅から毎フレーム直接算出。
    #[serde(default = "default_true")]
    pub use_baseline: bool,
    /// ベースライン更新を許す最小肩幅（正面向き判定）
    #[serde(default = "default_baseline_min_width")]
    pub baseline_min_width01: f32,
    /// 良フレームごとのベースライン追従率 (0=固定, 1=即時)
    #[serde(default = "default_baseline_follow")]
    pub baseline_follow: f32,
    /// ポーズ比率のクランプ範囲（横向き時の縮み防止）
    #[serde(default = "default_ratio_min")]
    pub ratio_min: f32,
    #[serde(default = "default_ratio_max")]
    pub ratio_max: f32,
    /// クランプ後の比率をどこまで適用するか
    #[serde(default = "default_ratio_follow")]
    pub ratio_follow: f32,
}

fn default_one() -> f32 { 1.0 }
fn default_baseline_min_width() -> f32 { 0.12 }
fn default_baseline_follow() -> f32 { 0.10 }
fn default_ratio_min() -> f32 { 0.90 }
fn default_ratio_max() -> f32 { 1.10 }
fn default_ratio_follow() -> f32 { 0.35 }

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            multiplier: default_one(),
            body_scale_influence: default_one(),
            use_baseline: true,
            baseline_min_width01: default_baseline_min_width(),
            baseline_follow: default_baseline_follow(),
            ratio_min: default_ratio_min(),
            ratio_max: default_ratio_max(),
            ratio_follow: default_ratio_follow(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ArmConfig {
    /// 腕ボーン回転の追従レート（毎秒）
    #[serde(default = "default_arm_follow_rate")]
    pub follow_rate: f32,
    /// 観測方向をカメラ平面へ射影してから解く
    #[serde(default = "default_true")]
    pub project_to_camera_plane: bool,
    /// ロール基準にカメラ前方を使う（falseならリグ前方）
    #[serde(default = "default_true")]
    pub camera_forward_roll_ref: bool,
    /// ロールをバインド姿勢へ寄せてジッタを抑える
    #[serde(default = "default_true")]
    pub freeze_roll_to_bind: bool,
    /// ロール凍結時のバインド側ブレンド比
    #[serde(default = "default_roll_freeze_weight")]
    pub roll_freeze_weight: f32,
    /// 左上腕バインド前方の符号反転（リグの軸規約差の補正）
    #[serde(default = "default_true")]
    pub flip_left_bind_forward: bool,
    /// 左前腕バインド前方の符号反転
    #[serde(default = "default_true")]
    pub flip_left_fore_bind_forward: bool,
    /// 手首から先をバインド回転へ追従させる
    #[serde(default = "default_true")]
    pub stabilize_hands: bool,
    #[serde(default = "default_hand_follow_rate")]
    pub hand_follow_rate: f32,
    /// ボーンごとの定数回転オフセット（オイラー角, 度）
    #[serde(default)]
    pub left_arm_offset_euler: [f32; 3],
    #[serde(default)]
    pub left_fore_arm_offset_euler: [f32; 3],
    #[serde(default)]
    pub right_arm_offset_euler: [f32; 3],
    #[serde(default)]
    pub right_fore_arm_offset_euler: [f32; 3],
}

fn default_arm_follow_rate() -> f32 { 26.0 }
fn default_roll_freeze_weight() -> f32 { 0.65 }
fn default_hand_follow_rate() -> f32 { 17.0 }

impl Default for ArmConfig {
    fn default() -> Self {
        Self {
            follow_rate: default_arm_follow_rate(),
            project_to_camera_plane: true,
            camera_forward_roll_ref: true,
            freeze_roll_to_bind: true,
            roll_freeze_weight: default_roll_freeze_weight(),
            flip_left_bind_forward: true,
            flip_left_fore_bind_forward: true,
            stabilize_hands: true,
            hand_follow_rate: default_hand_follow_rate(),
            left_arm_offset_euler: [0.0; 3],
            left_fore_arm_offset_euler: [0.0; 3],
            right_arm_offset_euler: [0.0; 3],
            right_fore_arm_offset_euler: [0.0; 3],
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LengthConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 近位セグメント（上腕）の追従レート（毎秒）
    #[serde(default = "default_length_follow_rate")]
    pub follow_rate: f32,
    /// 遠位セグメント（前腕）のレート倍率
    #[serde(default = "default_distal_rate_mul")]
    pub distal_rate_mul: f32,
    #[serde(default = "default_min_len_scale")]
    pub min_len_scale: f32,
    #[serde(default = "default_max_len_scale")]
    pub max_len_scale: f32,
    /// セグメントごとの適用重み (0=無効, 1=全適用)
    #[serde(default = "default_one")]
    pub proximal_weight: f32,
    #[serde(default = "default_one")]
    pub distal_weight: f32,
}

fn default_length_follow_rate() -> f32 { 17.0 }
fn default_distal_rate_mul() -> f32 { 2.2 }
fn default_min_len_scale() -> f32 { 0.7 }
fn default_max_len_scale() -> f32 { 1.35 }

impl Default for LengthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            follow_rate: default_length_follow_rate(),
            distal_rate_mul: default_distal_rate_mul(),
            min_len_scale: default_min_len_scale(),
            max_len_scale: default_max_len_scale(),
            proximal_weight: default_one(),
            distal_weight: default_one(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApplyConfig {
    /// ルート位置の臨界減衰時間（秒）
    #[serde(default = "default_pos_smooth_time")]
    pub pos_smooth_time: f32,
    /// 回転適用の指数レート（毎秒）
    #[serde(default = "default_rot_rate")]
    pub rot_rate: f32,
    /// スケール適用の指数レート（毎秒）
    #[serde(default = "default_scale_rate")]
    pub scale_rate: f32,
}

fn default_pos_smooth_time() -> f32 { 0.06 }
fn default_rot_rate() -> f32 { 10.0 }
fn default_scale_rate() -> f32 { 10.0 }

impl Default for ApplyConfig {
    fn default() -> Self {
        Self {
            pos_smooth_time: default_pos_smooth_time(),
            rot_rate: default_rot_rate(),
            scale_rate: default_scale_rate(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RootConfig {
    #[serde(default = "default_true")]
    pub drive_root: bool,
    /// ルートを腰中点に追従させる（falseなら肩中点）
    #[serde(default = "default_true")]
    pub anchor_to_hips: bool,
    #[serde(default)]
    pub pos_offset: [f32; 3],
    #[serde(default)]
    pub anchor_y_offset: f32,
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            drive_root: true,
            anchor_to_hips: true,
            pos_offset: [0.0; 3],
            anchor_y_offset: 0.0,
        }
    }
}

impl DriverConfig {
    /// 設定値の不変条件を検査する
    pub fn validate(&self) -> Result<()> {
        if self.depth.min_m >= self.depth.max_m {
            bail!(
                "depth range invalid: min {} >= max {}",
                self.depth.min_m,
                self.depth.max_m
            );
        }
        if self.yaw.hysteresis && self.yaw.freeze_in01 >= self.yaw.freeze_out01 {
            bail!(
                "yaw hysteresis band invalid: freeze_in {} >= freeze_out {}",
                self.yaw.freeze_in01,
                self.yaw.freeze_out01
            );
        }
        if self.scale.ratio_min > self.scale.ratio_max {
            bail!(
                "scale ratio range invalid: min {} > max {}",
                self.scale.ratio_min,
                self.scale.ratio_max
            );
        }
        if self.length.min_len_scale > self.length.max_len_scale {
            bail!(
                "length scale range invalid: min {} > max {}",
                self.length.min_len_scale,
                self.length.max_len_scale
            );
        }
        Ok(())
    }
}

/// 体格スケール供給元の設定
#[derive(Debug, Deserialize, Clone)]
pub struct BodyScaleConfig {
    #[serde(default = "default_true")]
    pub use_shoulders: bool,
    #[serde(default = "default_true")]
    pub use_hips: bool,
    /// 0=肩のみ, 1=腰のみ
    #[serde(default = "default_hips_weight")]
    pub hips_weight: f32,
    #[serde(default = "default_scale_rate")]
    pub follow_rate: f32,
    /// 観測が取れないときの係数
    #[serde(default = "default_one")]
    pub fallback: f32,
    /// 基準体格幅（メートル）
    #[serde(default = "default_ref_body_width_m")]
    pub ref_width_m: f32,
}

fn default_hips_weight() -> f32 { 0.5 }
fn default_ref_body_width_m() -> f32 { 0.36 }

impl Default for BodyScaleConfig {
    fn default() -> Self {
        Self {
            use_shoulders: true,
            use_hips: true,
            hips_weight: default_hips_weight(),
            follow_rate: default_scale_rate(),
            fallback: 1.0,
            ref_width_m: default_ref_body_width_m(),
        }
    }
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.driver.validate()?;
        Ok(config)
    }

    /// 読み込み失敗時はログを出してデフォルト設定で続行する
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("config load failed, using defaults: {e}");
                Config::default()
            }
        }
    }
}
