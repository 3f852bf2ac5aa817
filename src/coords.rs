// Coordinate algebra between the host (right-handed, Z-up, quaternion w-first) and the
// game (left-handed, Y-up, quaternion w-last). Conventions are type parameters, so a
// transform can only change convention through an explicit conversion.

use std::f64::consts::FRAC_PI_2;
use std::fmt;
use std::marker::PhantomData;

use glam::{DMat4, DQuat, DVec3};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::TransformError;

const NORM_EPSILON: f64 = 1e-12;
const SHEAR_TOLERANCE: f64 = 1e-6;

/// Marker for a coordinate convention.
pub trait Convention: Copy + fmt::Debug + PartialEq + Default + 'static {}

/// Host convention: right-handed, Z-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Host;

/// Game convention: left-handed, Y-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Game;

impl Convention for Host {}
impl Convention for Game {}

/// Decomposed pose: position, unit rotation and scale in convention `C`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform<C: Convention> {
    pub position: DVec3,
    pub rotation: DQuat,
    pub scale: DVec3,
    convention: PhantomData<C>,
}

pub type HostTransform = Transform<Host>;
pub type GameTransform = Transform<Game>;

impl<C: Convention> Transform<C> {
    /// Build a transform, normalizing the rotation.
    pub fn new(position: DVec3, rotation: DQuat, scale: DVec3) -> Result<Self, TransformError> {
        Ok(Self::from_parts(position, normalize_rotation(rotation)?, scale))
    }

    fn from_parts(position: DVec3, rotation: DQuat, scale: DVec3) -> Self {
        Transform {
            position,
            rotation,
            scale,
            convention: PhantomData,
        }
    }

    pub fn identity() -> Self {
        Self::from_parts(DVec3::ZERO, DQuat::IDENTITY, DVec3::ONE)
    }

    pub fn from_translation(position: DVec3) -> Self {
        Self::from_parts(position, DQuat::IDENTITY, DVec3::ONE)
    }

    pub fn to_matrix(&self) -> DMat4 {
        DMat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Decompose an affine matrix. Fails on singular or sheared input.
    pub fn from_matrix(matrix: &DMat4) -> Result<Self, TransformError> {
        ensure_invertible(matrix)?;
        let (scale, rotation, position) = matrix.to_scale_rotation_translation();
        let rotation = normalize_rotation(rotation)?;
        let decomposed = Self::from_parts(position, rotation, scale);

        let magnitude = matrix
            .to_cols_array()
            .iter()
            .fold(1.0_f64, |acc, v| acc.max(v.abs()));
        if !decomposed
            .to_matrix()
            .abs_diff_eq(*matrix, SHEAR_TOLERANCE * magnitude)
        {
            return Err(TransformError::SingularTransform);
        }
        Ok(decomposed)
    }

    /// Approximate equality on every component.
    pub fn abs_diff_eq(&self, other: &Self, tolerance: f64) -> bool {
        self.position.abs_diff_eq(other.position, tolerance)
            && self.rotation.abs_diff_eq(other.rotation, tolerance)
            && self.scale.abs_diff_eq(other.scale, tolerance)
    }
}

impl<C: Convention> Default for Transform<C> {
    fn default() -> Self {
        Self::identity()
    }
}

impl HostTransform {
    pub fn to_game(&self) -> GameTransform {
        host_to_game(self)
    }
}

impl GameTransform {
    pub fn to_host(&self) -> HostTransform {
        game_to_host(self)
    }

    /// Host-convention world matrix of this game pose.
    pub fn to_host_matrix(&self) -> DMat4 {
        self.to_host().to_matrix()
    }

    pub fn position_array(&self) -> [f64; 3] {
        self.position.to_array()
    }

    /// Rotation as (x, y, z, w).
    pub fn rotation_array(&self) -> [f64; 4] {
        self.rotation.to_array()
    }
}

/// Rotation applied after the basis change so the host camera's forward axis
/// lines up with the game's.
fn forward_correction() -> DQuat {
    DQuat::from_rotation_y(FRAC_PI_2)
}

fn swap_axes(v: DVec3) -> DVec3 {
    DVec3::new(v.z, v.y, v.x)
}

// Exchanging x and z flips handedness, so the rotation angle changes sign.
fn swap_rotation(q: DQuat) -> DQuat {
    DQuat::from_xyzw(-q.z, -q.y, -q.x, q.w)
}

pub fn host_to_game(t: &HostTransform) -> GameTransform {
    Transform::from_parts(
        swap_axes(t.position),
        (swap_rotation(t.rotation) * forward_correction()).normalize(),
        swap_axes(t.scale),
    )
}

pub fn game_to_host(t: &GameTransform) -> HostTransform {
    Transform::from_parts(
        swap_axes(t.position),
        swap_rotation(t.rotation * forward_correction().inverse()).normalize(),
        swap_axes(t.scale),
    )
}

pub fn host_matrix_to_game(matrix: &DMat4) -> Result<DMat4, TransformError> {
    Ok(HostTransform::from_matrix(matrix)?.to_game().to_matrix())
}

pub fn game_matrix_to_host(matrix: &DMat4) -> Result<DMat4, TransformError> {
    Ok(GameTransform::from_matrix(matrix)?.to_host().to_matrix())
}

/// Normalize a quaternion, rejecting zero or non-finite norms.
pub fn normalize_rotation(q: DQuat) -> Result<DQuat, TransformError> {
    let norm = q.length();
    if !norm.is_finite() || norm < NORM_EPSILON {
        return Err(TransformError::InvalidRotation);
    }
    Ok(q / norm)
}

fn ensure_invertible(matrix: &DMat4) -> Result<(), TransformError> {
    let det = matrix.determinant();
    if !matrix.is_finite() || !det.is_finite() || det.abs() < NORM_EPSILON {
        return Err(TransformError::SingularTransform);
    }
    Ok(())
}

pub fn inverse(matrix: &DMat4) -> Result<DMat4, TransformError> {
    ensure_invertible(matrix)?;
    Ok(matrix.inverse())
}

pub fn compose(parent: &DMat4, child: &DMat4) -> DMat4 {
    *parent * *child
}

/// Pose of `child_world` expressed in the frame of `parent_world`.
pub fn local_of(parent_world: &DMat4, child_world: &DMat4) -> Result<DMat4, TransformError> {
    Ok(compose(&inverse(parent_world)?, child_world))
}

pub fn matrix_from_trs(
    position: DVec3,
    rotation: DQuat,
    scale: DVec3,
) -> Result<DMat4, TransformError> {
    let rotation = normalize_rotation(rotation)?;
    Ok(DMat4::from_scale_rotation_translation(scale, rotation, position))
}

/// Wire form of a game transform: `[[x,y,z],[x,y,z,w],[x,y,z]]`.
#[derive(Serialize, Deserialize)]
struct TransformTriple([f64; 3], [f64; 4], [f64; 3]);

impl Serialize for GameTransform {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        TransformTriple(
            self.position.to_array(),
            self.rotation.to_array(),
            self.scale.to_array(),
        )
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for GameTransform {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let TransformTriple(position, rotation, scale) = TransformTriple::deserialize(deserializer)?;
        Transform::new(
            DVec3::from_array(position),
            DQuat::from_array(rotation),
            DVec3::from_array(scale),
        )
        .map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const TOLERANCE: f64 = 1e-6;

    fn vec3_strategy(range: std::ops::Range<f64>) -> impl Strategy<Value = DVec3> {
        (range.clone(), range.clone(), range).prop_map(|(x, y, z)| DVec3::new(x, y, z))
    }

    fn rotation_strategy() -> impl Strategy<Value = DQuat> {
        let angle = -std::f64::consts::PI..std::f64::consts::PI;
        (angle.clone(), angle.clone(), angle).prop_map(|(a, b, c)| {
            DQuat::from_euler(glam::EulerRot::XYZ, a, b, c)
        })
    }

    fn host_transform_strategy() -> impl Strategy<Value = HostTransform> {
        (
            vec3_strategy(-1000.0..1000.0),
            rotation_strategy(),
            vec3_strategy(0.1..10.0),
        )
            .prop_map(|(p, r, s)| HostTransform::new(p, r, s).unwrap())
    }

    fn matrix_strategy() -> impl Strategy<Value = DMat4> {
        (
            vec3_strategy(-100.0..100.0),
            rotation_strategy(),
            vec3_strategy(0.5..2.0),
        )
            .prop_map(|(p, r, s)| DMat4::from_scale_rotation_translation(s, r, p))
    }

    proptest! {
        #[test]
        fn host_game_round_trip(t in host_transform_strategy()) {
            let back = game_to_host(&host_to_game(&t));
            prop_assert!(back.abs_diff_eq(&t, TOLERANCE), "{:?} != {:?}", back, t);
        }

        #[test]
        fn game_host_round_trip(t in host_transform_strategy()) {
            let game = host_to_game(&t);
            let again = host_to_game(&game_to_host(&game));
            prop_assert!(again.abs_diff_eq(&game, TOLERANCE));
        }

        #[test]
        fn trs_matrix_matches_transform(
            p in vec3_strategy(-1000.0..1000.0),
            r in rotation_strategy(),
            s in vec3_strategy(0.1..10.0),
            norm in 0.25f64..4.0,
        ) {
            let m = matrix_from_trs(p, r * norm, s).unwrap();
            let expected = HostTransform::new(p, r, s).unwrap().to_matrix();
            prop_assert!(m.abs_diff_eq(expected, TOLERANCE), "{:?} != {:?}", m, expected);
        }

        #[test]
        fn matrix_round_trip(m in matrix_strategy()) {
            let back = game_matrix_to_host(&host_matrix_to_game(&m).unwrap()).unwrap();
            prop_assert!(back.abs_diff_eq(m, TOLERANCE), "{:?} != {:?}", back, m);
        }

        #[test]
        fn position_and_scale_swap_axes(t in host_transform_strategy()) {
            let game = host_to_game(&t);
            prop_assert_eq!(game.position, DVec3::new(t.position.z, t.position.y, t.position.x));
            prop_assert_eq!(game.scale, DVec3::new(t.scale.z, t.scale.y, t.scale.x));
        }

        #[test]
        fn local_of_composes_back(parent in matrix_strategy(), child in matrix_strategy()) {
            let local = local_of(&parent, &child).unwrap();
            let rebuilt = compose(&parent, &local);
            prop_assert!(rebuilt.abs_diff_eq(child, TOLERANCE), "{:?} != {:?}", rebuilt, child);
        }
    }

    #[test]
    fn host_identity_maps_to_corrected_game_identity() {
        let game = host_to_game(&HostTransform::identity());
        let expected = DQuat::from_xyzw(0.0, 0.0, 0.0, 1.0) * DQuat::from_rotation_y(FRAC_PI_2);
        assert!(game.rotation.abs_diff_eq(expected, TOLERANCE));

        let host = game_to_host(&game);
        assert!(host.rotation.abs_diff_eq(DQuat::IDENTITY, TOLERANCE));
    }

    #[test]
    fn rotation_about_x_becomes_negated_rotation_about_z() {
        let angle = 0.7;
        let swapped = swap_rotation(DQuat::from_rotation_x(angle));
        assert!(swapped.abs_diff_eq(DQuat::from_rotation_z(-angle), TOLERANCE));
    }

    #[test]
    fn zero_quaternion_is_invalid() {
        let err = HostTransform::new(DVec3::ZERO, DQuat::from_xyzw(0.0, 0.0, 0.0, 0.0), DVec3::ONE)
            .unwrap_err();
        assert_eq!(err, TransformError::InvalidRotation);
        assert_eq!(
            matrix_from_trs(DVec3::ONE, DQuat::from_xyzw(0.0, 0.0, 0.0, 0.0), DVec3::ONE),
            Err(TransformError::InvalidRotation)
        );
    }

    #[test]
    fn unnormalized_rotation_is_normalized() {
        let t = HostTransform::new(DVec3::ZERO, DQuat::from_xyzw(0.0, 0.0, 0.0, 2.0), DVec3::ONE)
            .unwrap();
        assert!(t.rotation.abs_diff_eq(DQuat::IDENTITY, TOLERANCE));
    }

    #[test]
    fn zero_scale_is_singular() {
        let m = DMat4::from_scale(DVec3::new(1.0, 0.0, 1.0));
        assert_eq!(HostTransform::from_matrix(&m), Err(TransformError::SingularTransform));
        assert_eq!(inverse(&m), Err(TransformError::SingularTransform));
    }

    #[test]
    fn shear_is_singular() {
        let mut m = DMat4::IDENTITY;
        m.y_axis.x = 0.5;
        assert_eq!(HostTransform::from_matrix(&m), Err(TransformError::SingularTransform));
    }

    #[test]
    fn game_transform_json_triple() {
        let json = r#"[[0,0,1],[0,0,0,1],[1,1,1]]"#;
        let t: GameTransform = serde_json::from_str(json).unwrap();
        assert_eq!(t.position, DVec3::new(0.0, 0.0, 1.0));
        assert_eq!(t.rotation, DQuat::IDENTITY);

        let encoded = serde_json::to_value(t).unwrap();
        assert_eq!(encoded, serde_json::json!([[0.0, 0.0, 1.0], [0.0, 0.0, 0.0, 1.0], [1.0, 1.0, 1.0]]));
    }

    #[test]
    fn game_transform_rejects_zero_rotation() {
        let json = r#"[[0,0,0],[0,0,0,0],[1,1,1]]"#;
        assert!(serde_json::from_str::<GameTransform>(json).is_err());
    }

    #[test]
    fn game_z_translation_lands_on_host_x() {
        let t: GameTransform = serde_json::from_str(r#"[[0,0,1],[0,0,0,1],[1,1,1]]"#).unwrap();
        let m = t.to_host_matrix();
        assert!(m.w_axis.truncate().abs_diff_eq(DVec3::new(1.0, 0.0, 0.0), TOLERANCE));
    }
}
