use nalgebra::{UnitQuaternion, Vector2, Vector3};

/// カメラの射影パラメータと姿勢
///
/// 右=+X, 上=+Y, 前方=+Z のローカル規約。メッシュとリグはこのカメラに
/// 相対して配置されるため、ワールド座標は常にカメラ基準。
#[derive(Debug, Clone)]
pub struct CameraView {
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    /// 垂直画角（度）
    pub fov_v_deg: f32,
    /// アスペクト比 (width / height)
    pub aspect: f32,
}

impl CameraView {
    pub fn new(fov_v_deg: f32, aspect: f32) -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            fov_v_deg,
            aspect,
        }
    }

    pub fn with_pose(mut self, position: Vector3<f32>, rotation: UnitQuaternion<f32>) -> Self {
        self.position = position;
        self.rotation = rotation;
        self
    }

    pub fn forward(&self) -> Vector3<f32> {
        self.rotation * Vector3::z()
    }

    pub fn right(&self) -> Vector3<f32> {
        self.rotation * Vector3::x()
    }

    pub fn up(&self) -> Vector3<f32> {
        self.rotation * Vector3::y()
    }

    /// ビューポート座標（原点左下, 0..1）+ 深度 → ワールド点
    pub fn viewport_to_world(&self, p01: Vector2<f32>, depth: f32) -> Vector3<f32> {
        let half_h = depth * (self.fov_v_deg.to_radians() * 0.5).tan();
        let half_w = half_h * self.aspect;
        let local = Vector3::new(
            (p01.x * 2.0 - 1.0) * half_w,
            (p01.y * 2.0 - 1.0) * half_h,
            depth,
        );
        self.position + self.rotation * local
    }

    /// ランドマーク座標（原点左上, 0..1）+ 深度 → ワールド点
    ///
    /// ランドマーク源は縦方向が射影規約と逆なので、ここで y を反転する。
    pub fn project(&self, lm01: Vector2<f32>, depth: f32) -> Vector3<f32> {
        self.viewport_to_world(Vector2::new(lm01.x, 1.0 - lm01.y), depth)
    }

    /// 2ランドマーク間のワールド差分ベクトル
    pub fn world_delta(&self, a01: Vector2<f32>, b01: Vector2<f32>, depth: f32) -> Vector3<f32> {
        self.project(b01, depth) - self.project(a01, depth)
    }

    /// 2ランドマーク間のワールド距離（メートル）
    pub fn world_width(&self, a01: Vector2<f32>, b01: Vector2<f32>, depth: f32) -> f32 {
        self.world_delta(a01, b01, depth).norm()
    }
}
