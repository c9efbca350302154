//! Core types for the pose gizmo.
//!
//! This module contains the public types used to configure the gizmo, describe
//! its handles and tag the Bevy entities it works with.

use bevy::prelude::*;
use std::fmt;

/// Which part of the delegate's pose the gizmo currently edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GizmoMode {
    /// Move the delegate along axes or planes.
    #[default]
    Translation,
    /// Rotate the delegate about an axis.
    Rotation,
}

impl GizmoMode {
    /// The other mode.
    pub fn toggled(self) -> Self {
        match self {
            GizmoMode::Translation => GizmoMode::Rotation,
            GizmoMode::Rotation => GizmoMode::Translation,
        }
    }
}

impl fmt::Display for GizmoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GizmoMode::Translation => f.write_str("Translation"),
            GizmoMode::Rotation => f.write_str("Rotation"),
        }
    }
}

/// Degrees of freedom a handle manipulates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisConstraint {
    /// Only the X axis.
    X,
    /// Only the Y axis.
    Y,
    /// Only the Z axis.
    Z,
    /// The XY plane.
    XY,
    /// The XZ plane.
    XZ,
    /// The YZ plane.
    YZ,
}

impl AxisConstraint {
    /// All constraints, single axes first.
    pub const ALL: [AxisConstraint; 6] = [
        AxisConstraint::X,
        AxisConstraint::Y,
        AxisConstraint::Z,
        AxisConstraint::XY,
        AxisConstraint::XZ,
        AxisConstraint::YZ,
    ];

    /// Whether the constraint names exactly one axis.
    pub fn is_single_axis(self) -> bool {
        matches!(self, AxisConstraint::X | AxisConstraint::Y | AxisConstraint::Z)
    }

    /// Unit vector of a single-axis constraint.
    pub fn axis(self) -> Option<Vec3> {
        match self {
            AxisConstraint::X => Some(Vec3::X),
            AxisConstraint::Y => Some(Vec3::Y),
            AxisConstraint::Z => Some(Vec3::Z),
            _ => None,
        }
    }

    /// Unit vector of the axis a two-axis constraint leaves out.
    pub fn unused_axis(self) -> Option<Vec3> {
        match self {
            AxisConstraint::XY => Some(Vec3::Z),
            AxisConstraint::XZ => Some(Vec3::Y),
            AxisConstraint::YZ => Some(Vec3::X),
            _ => None,
        }
    }

    /// Whether the constraint lets the delegate move along `axis` (0, 1, 2).
    pub fn allows(self, axis: usize) -> bool {
        match self {
            AxisConstraint::X => axis == 0,
            AxisConstraint::Y => axis == 1,
            AxisConstraint::Z => axis == 2,
            AxisConstraint::XY => axis != 2,
            AxisConstraint::XZ => axis != 1,
            AxisConstraint::YZ => axis != 0,
        }
    }
}

impl fmt::Display for AxisConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AxisConstraint::X => "X",
            AxisConstraint::Y => "Y",
            AxisConstraint::Z => "Z",
            AxisConstraint::XY => "XY",
            AxisConstraint::XZ => "XZ",
            AxisConstraint::YZ => "YZ",
        };
        f.write_str(name)
    }
}

/// What a handle does when pressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleKind {
    /// Arrow translating along one axis.
    ArrowTranslation,
    /// Square translating within a plane.
    PlaneTranslation,
    /// Ring rotating about one axis.
    RotationRing,
    /// Centre sphere switching between translation and rotation.
    ModeToggle,
}

impl HandleKind {
    /// The gizmo mode in which the handle is active, `None` for handles that
    /// stay active in both modes.
    pub fn mode(self) -> Option<GizmoMode> {
        match self {
            HandleKind::ArrowTranslation | HandleKind::PlaneTranslation => {
                Some(GizmoMode::Translation)
            }
            HandleKind::RotationRing => Some(GizmoMode::Rotation),
            HandleKind::ModeToggle => None,
        }
    }
}

/// Pickable bounding volume of a handle, in gizmo-local units.
///
/// Gizmo-local means relative to the delegate's position and multiplied by
/// the gizmo's current scale; axes stay world aligned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PickVolume {
    /// A sphere.
    Sphere {
        /// Centre of the sphere.
        center: Vec3,
        /// Radius of the sphere.
        radius: f32,
    },
    /// A segment with a radius, used for arrows.
    Capsule {
        /// Segment start.
        from: Vec3,
        /// Segment end.
        to: Vec3,
        /// Pick radius around the segment.
        radius: f32,
    },
    /// A square spanned by two axes.
    Quad {
        /// Centre of the square.
        center: Vec3,
        /// First in-plane axis.
        axis_a: Vec3,
        /// Second in-plane axis.
        axis_b: Vec3,
        /// Half the side length.
        half_extent: f32,
    },
    /// A ring around the origin.
    Ring {
        /// Axis the ring turns about.
        normal: Vec3,
        /// Ring radius.
        radius: f32,
        /// Pick tolerance across the ring.
        thickness: f32,
    },
}

/// A pickable on-screen affordance of the gizmo.
#[derive(Debug, Clone)]
pub struct Handle {
    /// What pressing the handle does.
    pub kind: HandleKind,
    /// Degrees of freedom the handle manipulates.
    pub constraint: AxisConstraint,
    /// Colour when idle.
    pub color: Color,
    /// Colour while hovered or dragged.
    pub highlight_color: Color,
    /// Picking priority; higher wins when several handles are hit.
    pub priority: i32,
    /// Pickable volume.
    pub volume: PickVolume,
    /// Whether the handle is pickable and drawn.
    pub enabled: bool,
    /// Whether hovering highlights the handle.
    pub highlight_on_hover: bool,
    /// The cursor is over the handle.
    pub hovered: bool,
    /// The handle is being dragged.
    pub dragged: bool,
}

impl Handle {
    /// Creates an enabled, idle handle.
    pub fn new(
        kind: HandleKind,
        constraint: AxisConstraint,
        color: Color,
        priority: i32,
        volume: PickVolume,
    ) -> Self {
        Self {
            kind,
            constraint,
            color,
            highlight_color: HandleColors::default().highlight,
            priority,
            volume,
            enabled: true,
            highlight_on_hover: true,
            hovered: false,
            dragged: false,
        }
    }

    /// Whether the handle should currently be drawn highlighted.
    pub fn is_highlighted(&self) -> bool {
        self.dragged || (self.highlight_on_hover && self.hovered)
    }

    /// Colour to draw the handle with right now.
    pub fn display_color(&self) -> Color {
        if self.is_highlighted() {
            self.highlight_color
        } else {
            self.color
        }
    }

    /// Clears hover and drag state.
    pub fn clear_highlight(&mut self) {
        self.hovered = false;
        self.dragged = false;
    }
}

/// Colour palette for the default handle set.
#[derive(Clone, Debug)]
pub struct HandleColors {
    /// X arrow and ring.
    pub x: Color,
    /// Y arrow and ring.
    pub y: Color,
    /// Z arrow and ring.
    pub z: Color,
    /// XY square.
    pub xy: Color,
    /// YZ square.
    pub yz: Color,
    /// XZ square.
    pub xz: Color,
    /// Centre sphere.
    pub center: Color,
    /// Hover/drag colour shared by all handles.
    pub highlight: Color,
}

impl HandleColors {
    /// Colour for the handle bound to `constraint`.
    pub fn for_constraint(&self, constraint: AxisConstraint) -> Color {
        match constraint {
            AxisConstraint::X => self.x,
            AxisConstraint::Y => self.y,
            AxisConstraint::Z => self.z,
            AxisConstraint::XY => self.xy,
            AxisConstraint::YZ => self.yz,
            AxisConstraint::XZ => self.xz,
        }
    }
}

impl Default for HandleColors {
    fn default() -> Self {
        Self {
            x: Color::srgb_u8(220, 50, 100),
            y: Color::srgb_u8(50, 220, 100),
            z: Color::srgb_u8(50, 100, 220),
            xy: Color::srgb_u8(80, 220, 170),
            yz: Color::srgb_u8(220, 220, 80),
            xz: Color::srgb_u8(210, 90, 180),
            center: Color::srgb_u8(50, 50, 50),
            highlight: Color::srgb_u8(255, 255, 180),
        }
    }
}

/// Sizing and appearance of the pose gizmo, in gizmo-local units.
#[derive(Resource, Clone)]
pub struct PoseGizmoStyle {
    /// Colours of the handles.
    pub colors: HandleColors,
    /// Length of the translation arrows.
    pub arrow_length: f32,
    /// Length of the arrow head cone.
    pub arrow_head_length: f32,
    /// Radius of the arrow head cone base.
    pub arrow_head_radius: f32,
    /// Pick radius around the arrows.
    pub arrow_pick_radius: f32,
    /// Offset of the plane squares from the origin along both axes.
    pub plane_offset: f32,
    /// Half side length of the plane squares.
    pub plane_half_extent: f32,
    /// Radius of the rotation rings.
    pub ring_radius: f32,
    /// Pick tolerance across the rotation rings.
    pub ring_pick_thickness: f32,
    /// Number of segments per drawn ring.
    pub ring_segments: usize,
    /// Radius of the centre mode-toggle sphere.
    pub center_radius: f32,
    /// Picking priority given to every handle.
    pub picking_priority: i32,
    /// Line width for gizmo rendering (in pixels).
    pub line_width: f32,
    /// Depth bias to draw the gizmo on top of regular geometry.
    pub depth_bias: f32,
}

impl Default for PoseGizmoStyle {
    fn default() -> Self {
        Self {
            colors: HandleColors::default(),
            arrow_length: 0.7,
            arrow_head_length: 0.2,
            arrow_head_radius: 0.05,
            arrow_pick_radius: 0.06,
            plane_offset: 0.2,
            plane_half_extent: 0.06,
            ring_radius: 0.6,
            ring_pick_thickness: 0.05,
            ring_segments: 64,
            center_radius: 0.05,
            picking_priority: 100,
            line_width: 3.0,
            depth_bias: -1.0,
        }
    }
}

/// Marker component for the camera the pose gizmo is operated through.
///
/// # Example
///
/// ```ignore
/// commands.spawn((
///     Camera3d::default(),
///     Transform::from_xyz(0.0, 0.0, 5.0).looking_at(Vec3::ZERO, Vec3::Y),
///     PoseGizmoCamera,
/// ));
/// ```
#[derive(Component)]
pub struct PoseGizmoCamera;

/// Marks the object-model entity whose transform the gizmo edits.
///
/// Only one delegate should exist at a time; if several do, the first one
/// found is used.
#[derive(Component)]
pub struct PoseGizmoDelegate;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constraint_axes() {
        assert_eq!(AxisConstraint::Y.axis(), Some(Vec3::Y));
        assert_eq!(AxisConstraint::XY.axis(), None);
        assert_eq!(AxisConstraint::XZ.unused_axis(), Some(Vec3::Y));
        assert!(AxisConstraint::YZ.allows(2));
        assert!(!AxisConstraint::YZ.allows(0));
    }

    #[test]
    fn highlight_follows_drag_and_hover() {
        let mut handle = Handle::new(
            HandleKind::ArrowTranslation,
            AxisConstraint::X,
            Color::BLACK,
            0,
            PickVolume::Sphere {
                center: Vec3::ZERO,
                radius: 1.0,
            },
        );
        assert!(!handle.is_highlighted());
        handle.hovered = true;
        assert!(handle.is_highlighted());
        handle.highlight_on_hover = false;
        assert!(!handle.is_highlighted());
        handle.dragged = true;
        assert_eq!(handle.display_color(), handle.highlight_color);
        handle.clear_highlight();
        assert_eq!(handle.display_color(), Color::BLACK);
    }
}
