use nalgebra::{Quaternion, Rotation3, UnitQuaternion, Vector3};

/// 時間ベースの指数追従係数: 1 - e^(-rate*dt)
///
/// フレームレート非依存。rate=0で追従なし、rateが大きいほど即応。
pub fn exp_follow(rate: f32, dt: f32) -> f32 {
    if rate <= 0.0 {
        return 0.0;
    }
    1.0 - (-rate * dt).exp()
}

pub fn clamp01(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

/// ベクトルを法線nの平面に射影する（nは正規化済みであること）
pub fn project_on_plane(v: Vector3<f32>, n: Vector3<f32>) -> Vector3<f32> {
    v - n * v.dot(&n)
}

/// クォータニオンのNLERP（最短経路）
///
/// dot < 0 なら片方を反転してから線形補間し正規化する。
/// SLERPより安価で、姿勢追従用途では十分な精度。
pub fn nlerp(a: &UnitQuaternion<f32>, b: &UnitQuaternion<f32>, t: f32) -> UnitQuaternion<f32> {
    let qa = a.coords;
    let mut qb = b.coords;
    if qa.dot(&qb) < 0.0 {
        qb = -qb;
    }
    let mixed = qa.lerp(&qb, t.clamp(0.0, 1.0));
    UnitQuaternion::from_quaternion(Quaternion::from_vector(mixed))
}

/// 方向ベクトルのNLERP。結果は正規化される。
/// 両者がほぼ逆向きで補間結果が潰れる場合はbを返す。
pub fn nlerp_vec(a: Vector3<f32>, b: Vector3<f32>, t: f32) -> Vector3<f32> {
    let mixed = a.lerp(&b, t.clamp(0.0, 1.0));
    if mixed.norm_squared() < 1e-10 {
        return b;
    }
    mixed.normalize()
}

/// forwardをZ軸、upを補助ヒントとする回転を構築する
///
/// Z軸は正確にforward方向、X = up × Z、Y = Z × X。
/// forwardが零、またはupとforwardが平行な場合はNone。
pub fn look_rotation(forward: Vector3<f32>, up: Vector3<f32>) -> Option<UnitQuaternion<f32>> {
    if forward.norm_squared() < 1e-10 {
        return None;
    }
    let z = forward.normalize();
    let x = up.cross(&z);
    if x.norm_squared() < 1e-10 {
        return None;
    }
    let x = x.normalize();
    let y = z.cross(&x);
    let rot = Rotation3::from_basis_unchecked(&[x, y, z]);
    Some(UnitQuaternion::from_rotation_matrix(&rot))
}

/// 臨界減衰バネによる位置平滑化
///
/// smooth_time: 目標の約63%に到達するまでのおおよその時間（秒）
/// velocity: 呼び出し間で保持する速度状態
pub fn smooth_damp(
    current: Vector3<f32>,
    target: Vector3<f32>,
    velocity: &mut Vector3<f32>,
    smooth_time: f32,
    dt: f32,
) -> Vector3<f32> {
    let smooth_time = smooth_time.max(1e-4);
    let omega = 2.0 / smooth_time;
    let x = omega * dt;
    let exp = 1.0 / (1.0 + x + 0.48 * x * x + 0.235 * x * x * x);

    let change = current - target;
    let temp = (*velocity + change * omega) * dt;
    *velocity = (*velocity - temp * omega) * exp;
    let mut out = target + (change + temp) * exp;

    // オーバーシュート防止
    if (target - current).dot(&(out - target)) > 0.0 {
        out = target;
        *velocity = Vector3::zeros();
    }
    out
}

/// 2角度間の最短差分（度, -180..180）
pub fn delta_angle_deg(a: f32, b: f32) -> f32 {
    let mut d = (b - a) % 360.0;
    if d > 180.0 {
        d -= 360.0;
    } else if d < -180.0 {
        d += 360.0;
    }
    d
}

/// 角度の線形補間（度）。最短経路をとる。
pub fn lerp_angle_deg(a: f32, b: f32, t: f32) -> f32 {
    a + delta_angle_deg(a, b) * clamp01(t)
}
