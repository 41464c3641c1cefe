// src/proto.rs
// Binary wire schema shared with the browser player (protobuf via prost)
//
// Field tags are part of the client contract; append new fields, never renumber.

use bytes::Bytes;
use prost::Message;

#[derive(Clone, PartialEq, Message)]
pub struct RelativeLocation {
    #[prost(double, tag = "1")]
    pub x: f64,
    #[prost(double, tag = "2")]
    pub y: f64,
    #[prost(double, tag = "3")]
    pub z: f64,
}

#[derive(Clone, PartialEq, Message)]
pub struct AbsoluteLocation {
    #[prost(int64, tag = "1")]
    pub x: i64,
    #[prost(int64, tag = "2")]
    pub y: i64,
    #[prost(int64, tag = "3")]
    pub z: i64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Quaternion {
    #[prost(double, tag = "1")]
    pub x: f64,
    #[prost(double, tag = "2")]
    pub y: f64,
    #[prost(double, tag = "3")]
    pub z: f64,
    #[prost(double, tag = "4")]
    pub w: f64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Vector {
    #[prost(double, tag = "1")]
    pub x: f64,
    #[prost(double, tag = "2")]
    pub y: f64,
    #[prost(double, tag = "3")]
    pub z: f64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Face {
    #[prost(uint64, tag = "1")]
    pub a: u64,
    #[prost(uint64, tag = "2")]
    pub b: u64,
    #[prost(uint64, tag = "3")]
    pub c: u64,
    #[prost(double, repeated, tag = "4")]
    pub uvs: Vec<f64>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Body {
    #[prost(enumeration = "body::Type", tag = "1")]
    pub r#type: i32,
    #[prost(uint64, tag = "2")]
    pub mesh_id: u64,
    #[prost(double, repeated, tag = "3")]
    pub vertices: Vec<f64>,
    #[prost(message, repeated, tag = "4")]
    pub faces: Vec<Face>,
    #[prost(uint64, tag = "5")]
    pub material: u64,
    #[prost(bool, tag = "6")]
    pub flat_normals: bool,
    /// Primitive dimensions for BOX / SPHERE bodies
    #[prost(double, repeated, tag = "7")]
    pub data: Vec<f64>,
}

pub mod body {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Mesh = 0,
        Box = 1,
        Sphere = 2,
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct Light {
    #[prost(enumeration = "light::Type", tag = "1")]
    pub r#type: i32,
    #[prost(string, tag = "2")]
    pub color: String,
    #[prost(float, tag = "3")]
    pub intensity: f32,
    #[prost(message, optional, tag = "4")]
    pub position: Option<RelativeLocation>,
}

pub mod light {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        PointLight = 0,
        AmbientLight = 1,
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct Entity {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(message, optional, tag = "2")]
    pub location: Option<RelativeLocation>,
    #[prost(message, optional, tag = "3")]
    pub rotation: Option<Quaternion>,
    #[prost(message, optional, tag = "4")]
    pub velocity: Option<Vector>,
    #[prost(message, optional, tag = "5")]
    pub rotational_velocity: Option<Vector>,
    #[prost(message, repeated, tag = "6")]
    pub bodies: Vec<Body>,
    #[prost(message, repeated, tag = "7")]
    pub lights: Vec<Light>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Chunk {
    #[prost(message, optional, tag = "1")]
    pub location: Option<AbsoluteLocation>,
    #[prost(message, repeated, tag = "2")]
    pub entities: Vec<Entity>,
}

/// One streamed texture frame. `parts == 0` means the frame carries the whole file.
#[derive(Clone, PartialEq, Message)]
pub struct Texture {
    #[prost(bytes = "bytes", tag = "1")]
    pub data: Bytes,
    #[prost(uint64, tag = "2")]
    pub part: u64,
    #[prost(uint64, tag = "3")]
    pub parts: u64,
}

#[derive(Clone, PartialEq, Message)]
pub struct Material {
    #[prost(string, tag = "1")]
    pub color: String,
    #[prost(uint64, tag = "2")]
    pub texture_id: u64,
    #[prost(string, tag = "3")]
    pub emissive: String,
    #[prost(float, tag = "4")]
    pub metalness: f32,
    #[prost(enumeration = "material::Side", tag = "5")]
    pub side: i32,
    #[prost(float, tag = "6")]
    pub roughness: f32,
    #[prost(bool, tag = "7")]
    pub wireframe: bool,
    #[prost(bool, tag = "8")]
    pub flat_shaded: bool,
}

pub mod material {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Side {
        FrontSide = 0,
        BackSide = 1,
        DoubleSide = 2,
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct Mesh {
    #[prost(uint64, tag = "1")]
    pub id: u64,
    #[prost(double, repeated, tag = "2")]
    pub vertices: Vec<f64>,
    #[prost(message, repeated, tag = "3")]
    pub faces: Vec<Face>,
}

#[derive(Clone, PartialEq, Message)]
pub struct Request {
    #[prost(enumeration = "request::Type", tag = "1")]
    pub r#type: i32,
    #[prost(uint64, tag = "2")]
    pub id: u64,
}

pub mod request {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Texture = 0,
        Material = 1,
        Mesh = 2,
    }
}

#[derive(Clone, PartialEq, Message)]
pub struct Response {
    #[prost(enumeration = "response::Type", tag = "1")]
    pub r#type: i32,
    #[prost(uint64, tag = "2")]
    pub id: u64,
    #[prost(message, optional, tag = "3")]
    pub chunk: Option<Chunk>,
    #[prost(message, optional, tag = "4")]
    pub texture: Option<Texture>,
    #[prost(message, optional, tag = "5")]
    pub material: Option<Material>,
    #[prost(message, optional, tag = "6")]
    pub mesh: Option<Mesh>,
}

pub mod response {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
    #[repr(i32)]
    pub enum Type {
        Chunk = 0,
        Texture = 1,
        Material = 2,
        Mesh = 3,
    }
}

/// Per-entity state pushed on the update channel every tick. Clients send the
/// same shape back to report their own position.
#[derive(Clone, PartialEq, Message)]
pub struct Update {
    #[prost(uint64, tag = "1")]
    pub entity_id: u64,
    #[prost(message, optional, tag = "2")]
    pub position: Option<RelativeLocation>,
    #[prost(message, optional, tag = "3")]
    pub rotation: Option<Quaternion>,
    #[prost(message, optional, tag = "4")]
    pub velocity: Option<Vector>,
    #[prost(message, optional, tag = "5")]
    pub rotational_velocity: Option<Vector>,
}

/// Encode any message into an owned frame ready for a transport send
pub fn encode<M: Message>(message: &M) -> Bytes {
    Bytes::from(message.encode_to_vec())
}

impl From<glam::DVec3> for RelativeLocation {
    fn from(v: glam::DVec3) -> Self {
        Self { x: v.x, y: v.y, z: v.z }
    }
}

impl From<&RelativeLocation> for glam::DVec3 {
    fn from(v: &RelativeLocation) -> Self {
        glam::DVec3::new(v.x, v.y, v.z)
    }
}

impl From<glam::DVec3> for Vector {
    fn from(v: glam::DVec3) -> Self {
        Self { x: v.x, y: v.y, z: v.z }
    }
}

impl From<glam::DQuat> for Quaternion {
    fn from(q: glam::DQuat) -> Self {
        Self { x: q.x, y: q.y, z: q.z, w: q.w }
    }
}
