use nalgebra::{Vector2, Vector3};

use super::index::{LandmarkIndex, Side};

/// 単一ランドマーク
///
/// x, y は正規化画像座標 (0.0〜1.0、原点は左上)。
/// z は弱い相対深度（腰中心基準の無次元値、正で奥）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// 推定器がこの点を返したか
    pub present: bool,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self {
            x,
            y,
            z,
            present: true,
        }
    }

    pub fn xy(&self) -> Vector2<f32> {
        Vector2::new(self.x, self.y)
    }

    pub fn xyz(&self) -> Vector3<f32> {
        Vector3::new(self.x, self.y, self.z)
    }
}

impl Default for Landmark {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            present: false,
        }
    }
}

/// 33ランドマークからなる1フレーム分のスナップショット
///
/// 推論1回ごとに生成される読み取り専用の値型。上流の結果形式の揺れは
/// このアダプタで吸収し、コア側は固定トポロジーだけを見る。
#[derive(Debug, Clone)]
pub struct LandmarkFrame {
    landmarks: [Landmark; LandmarkIndex::COUNT],
}

impl LandmarkFrame {
    pub fn new(landmarks: [Landmark; LandmarkIndex::COUNT]) -> Self {
        Self { landmarks }
    }

    /// スライスからフレームを構築する。
    /// 期待する点数(33)に満たない入力はフレームごと無効として None。
    pub fn from_slice(landmarks: &[Landmark]) -> Option<Self> {
        if landmarks.len() < LandmarkIndex::COUNT {
            return None;
        }
        let mut arr = [Landmark::default(); LandmarkIndex::COUNT];
        arr.copy_from_slice(&landmarks[..LandmarkIndex::COUNT]);
        Some(Self { landmarks: arr })
    }

    pub fn get(&self, index: LandmarkIndex) -> Option<&Landmark> {
        let lm = &self.landmarks[index as usize];
        lm.present.then_some(lm)
    }

    /// 肩の左右 (xyのみ)
    pub fn shoulders(&self) -> Option<(Vector2<f32>, Vector2<f32>)> {
        let l = self.get(LandmarkIndex::LeftShoulder)?;
        let r = self.get(LandmarkIndex::RightShoulder)?;
        Some((l.xy(), r.xy()))
    }

    /// 腰の左右 (xyのみ)
    pub fn hips(&self) -> Option<(Vector2<f32>, Vector2<f32>)> {
        let l = self.get(LandmarkIndex::LeftHip)?;
        let r = self.get(LandmarkIndex::RightHip)?;
        Some((l.xy(), r.xy()))
    }

    /// 肩の左右 (弱いz込み)
    pub fn shoulders_z(&self) -> Option<(Vector3<f32>, Vector3<f32>)> {
        let l = self.get(LandmarkIndex::LeftShoulder)?;
        let r = self.get(LandmarkIndex::RightShoulder)?;
        Some((l.xyz(), r.xyz()))
    }

    /// 腰の左右 (弱いz込み)
    pub fn hips_z(&self) -> Option<(Vector3<f32>, Vector3<f32>)> {
        let l = self.get(LandmarkIndex::LeftHip)?;
        let r = self.get(LandmarkIndex::RightHip)?;
        Some((l.xyz(), r.xyz()))
    }

    /// 片腕の (肩, 肘, 手首)
    pub fn arm(&self, side: Side) -> Option<(Vector2<f32>, Vector2<f32>, Vector2<f32>)> {
        let (s, e, w) = match side {
            Side::Left => (
                LandmarkIndex::LeftShoulder,
                LandmarkIndex::LeftElbow,
                LandmarkIndex::LeftWrist,
            ),
            Side::Right => (
                LandmarkIndex::RightShoulder,
                LandmarkIndex::RightElbow,
                LandmarkIndex::RightWrist,
            ),
        };
        Some((self.get(s)?.xy(), self.get(e)?.xy(), self.get(w)?.xy()))
    }
}
