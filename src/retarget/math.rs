//! ベクトル・クォータニオンの補助関数
//!
//! どの関数も退化入力（ゼロ長・反平行）でパニックせず、NaN も返さない。

use nalgebra::{Quaternion, Unit, UnitQuaternion, Vector3};
use std::f32::consts::PI;

/// ゼロ長とみなす長さ
pub const EPSILON: f32 = 1e-6;

/// 単位ベクトル。ゼロ長・非有限なら None
pub fn normalize(v: Vector3<f32>) -> Option<Vector3<f32>> {
    let norm = v.norm();
    if norm.is_finite() && norm > EPSILON {
        Some(v / norm)
    } else {
        None
    }
}

/// 正規化してから `length` 倍する。ゼロ長・非有限なら None
pub fn scaled_direction(v: Vector3<f32>, length: f32) -> Option<Vector3<f32>> {
    normalize(v).map(|n| n * length)
}

/// `normal` を法線とする平面へ射影
pub fn project_on_plane(v: Vector3<f32>, normal: Vector3<f32>) -> Vector3<f32> {
    let n2 = normal.norm_squared();
    if n2 < EPSILON * EPSILON {
        return v;
    }
    v - normal * (v.dot(&normal) / n2)
}

/// `from` を `to` に重ねる最短回転
///
/// 反平行の場合は `from` に垂直で、なるべく上方向(Y)に近い軸で半回転する。
pub fn from_to_rotation(from: Vector3<f32>, to: Vector3<f32>) -> UnitQuaternion<f32> {
    shortest_arc(from, to, None)
}

fn shortest_arc(
    from: Vector3<f32>,
    to: Vector3<f32>,
    half_turn_axis: Option<Vector3<f32>>,
) -> UnitQuaternion<f32> {
    let (a, b) = match (normalize(from), normalize(to)) {
        (Some(a), Some(b)) => (a, b),
        _ => return UnitQuaternion::identity(),
    };

    let cos = a.dot(&b);
    if cos < -1.0 + EPSILON {
        return half_turn(a, half_turn_axis);
    }
    match UnitQuaternion::rotation_between(&a, &b) {
        Some(q) => q,
        None if cos < 0.0 => half_turn(a, half_turn_axis),
        None => UnitQuaternion::identity(),
    }
}

fn half_turn(a: Vector3<f32>, preferred: Option<Vector3<f32>>) -> UnitQuaternion<f32> {
    let axis = preferred
        .and_then(|p| normalize(project_on_plane(p, a)))
        .or_else(|| normalize(project_on_plane(Vector3::y(), a)))
        .or_else(|| normalize(project_on_plane(Vector3::x(), a)))
        .unwrap_or_else(Vector3::z);
    UnitQuaternion::from_axis_angle(&Unit::new_unchecked(axis), PI)
}

/// 2本のベクトルの組 (fromA, fromB) を (toA, toB) に合わせる回転
///
/// A は完全に一致させ、B は A に垂直な平面上で最も近づける。
pub fn rotate_vectors(
    from_a: Vector3<f32>,
    from_b: Vector3<f32>,
    to_a: Vector3<f32>,
    to_b: Vector3<f32>,
) -> UnitQuaternion<f32> {
    let q2 = from_to_rotation(from_a, to_a);
    let v1 = q2.inverse_transform_vector(&to_b);
    let from_b_proj = project_on_plane(from_b, from_a);
    let v1_proj = project_on_plane(v1, from_a);
    // 射影同士は from_a に垂直なので、半回転も from_a 軸まわり
    let q1 = shortest_arc(from_b_proj, v1_proj, Some(from_a));
    UnitQuaternion::new_normalize((q2 * q1).into_inner())
}

/// スイング・ツイスト分解でツイスト成分を取り除き、スイングだけを返す
pub fn remove_twist(rotation: UnitQuaternion<f32>, axis: Vector3<f32>) -> UnitQuaternion<f32> {
    let n = match normalize(axis) {
        Some(n) => n,
        None => return rotation,
    };
    let q = rotation.into_inner();
    let projected = n * q.imag().dot(&n);
    let twist = Quaternion::from_parts(q.w, projected);
    // 軸まわりに完全に直交する半回転ではツイストが定義できない
    let twist = match normalize_quaternion(&twist) {
        Some(t) => UnitQuaternion::new_unchecked(t),
        None => return rotation,
    };
    rotation * twist.inverse()
}

/// 長さがほぼゼロなら None
pub fn normalize_quaternion(q: &Quaternion<f32>) -> Option<Quaternion<f32>> {
    let norm = q.norm();
    if norm.is_finite() && norm > EPSILON {
        Some(*q / norm)
    } else {
        None
    }
}

/// 未設定（全成分ゼロ）または NaN を含むクォータニオン
pub fn is_quaternion_invalid(q: &Quaternion<f32>) -> bool {
    let c = &q.coords;
    if c.iter().all(|v| *v == 0.0) {
        return true;
    }
    c.iter().any(|v| v.is_nan())
}

/// 最短経路の正規化線形補間。結果がゼロ長なら全成分ゼロを返す
pub fn nlerp(a: &Quaternion<f32>, b: &Quaternion<f32>, t: f32) -> Quaternion<f32> {
    let t = t.clamp(0.0, 1.0);
    let sign = if a.dot(b) < 0.0 { -1.0 } else { 1.0 };
    let mixed = *a * (1.0 - t) + *b * (t * sign);
    normalize_quaternion(&mixed).unwrap_or_else(|| Quaternion::new(0.0, 0.0, 0.0, 0.0))
}

/// 球面線形補間。曖昧な配置では正規化線形補間に落とす
pub fn slerp(a: &UnitQuaternion<f32>, b: &UnitQuaternion<f32>, t: f32) -> UnitQuaternion<f32> {
    let t = t.clamp(0.0, 1.0);
    a.try_slerp(b, t, EPSILON).unwrap_or_else(|| {
        let mixed = nlerp(a.quaternion(), b.quaternion(), t);
        if is_quaternion_invalid(&mixed) {
            *b
        } else {
            UnitQuaternion::new_unchecked(mixed)
        }
    })
}

/// (x, y, z, w) 順の配列から
pub fn quaternion_from_xyzw(v: [f32; 4]) -> Quaternion<f32> {
    Quaternion::new(v[3], v[0], v[1], v[2])
}
