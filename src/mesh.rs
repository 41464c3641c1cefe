// src/mesh.rs
// Procedural geometry for static world meshes.
// Pure functions: triangles in, deduplicated vertex buffer + indexed faces out.

use std::collections::HashMap;

use glam::DVec3;

use crate::proto::Face;

/// Flat vertex buffer (xyz triples) plus indexed triangles
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Geometry {
    pub vertices: Vec<f64>,
    pub faces: Vec<Face>,
}

impl Geometry {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / 3
    }

    /// Collapse a triangle soup into shared vertices
    fn from_triangles(triangles: &[[DVec3; 3]]) -> Self {
        let mut index: HashMap<[u64; 3], u64> = HashMap::new();
        let mut vertices = Vec::new();
        let mut faces = Vec::with_capacity(triangles.len());

        let mut lookup = |v: DVec3, vertices: &mut Vec<f64>| -> u64 {
            // Normalise -0.0 so it hashes like 0.0
            let key = [(v.x + 0.0).to_bits(), (v.y + 0.0).to_bits(), (v.z + 0.0).to_bits()];
            *index.entry(key).or_insert_with(|| {
                vertices.extend_from_slice(&[v.x, v.y, v.z]);
                (vertices.len() / 3 - 1) as u64
            })
        };

        for [a, b, c] in triangles {
            let a = lookup(*a, &mut vertices);
            let b = lookup(*b, &mut vertices);
            let c = lookup(*c, &mut vertices);
            faces.push(Face { a, b, c, uvs: Vec::new() });
        }

        Self { vertices, faces }
    }
}

/// Axis-aligned box centred on the origin with the given edge lengths
pub fn cuboid(x: f64, y: f64, z: f64) -> Geometry {
    let h = DVec3::new(x, y, z) * 0.5;
    let corner = |sx: f64, sy: f64, sz: f64| DVec3::new(sx * h.x, sy * h.y, sz * h.z);

    let p = [
        corner(-1.0, -1.0, -1.0),
        corner(1.0, -1.0, -1.0),
        corner(1.0, 1.0, -1.0),
        corner(-1.0, 1.0, -1.0),
        corner(-1.0, -1.0, 1.0),
        corner(1.0, -1.0, 1.0),
        corner(1.0, 1.0, 1.0),
        corner(-1.0, 1.0, 1.0),
    ];

    // Counter-clockwise quads seen from outside
    let quads = [
        [4, 5, 6, 7], // +z
        [1, 0, 3, 2], // -z
        [5, 1, 2, 6], // +x
        [0, 4, 7, 3], // -x
        [7, 6, 2, 3], // +y
        [0, 1, 5, 4], // -y
    ];

    let triangles: Vec<[DVec3; 3]> = quads
        .iter()
        .flat_map(|q| [[p[q[0]], p[q[1]], p[q[2]]], [p[q[0]], p[q[2]], p[q[3]]]])
        .collect();

    Geometry::from_triangles(&triangles)
}

/// Capped cylinder along +y, unit radius and height, `segments` around
pub fn cylinder(segments: usize) -> Geometry {
    let segments = segments.max(3);
    let top = DVec3::new(0.0, 0.5, 0.0);
    let bottom = DVec3::new(0.0, -0.5, 0.0);

    let ring = |i: usize, y: f64| {
        let a = (i % segments) as f64 / segments as f64 * std::f64::consts::TAU;
        DVec3::new(a.cos(), y, a.sin())
    };

    let mut triangles = Vec::with_capacity(segments * 4);
    for i in 0..segments {
        let (b0, b1) = (ring(i, -0.5), ring(i + 1, -0.5));
        let (t0, t1) = (ring(i, 0.5), ring(i + 1, 0.5));
        triangles.push([b0, t0, t1]);
        triangles.push([b0, t1, b1]);
        triangles.push([top, t1, t0]);
        triangles.push([bottom, b0, b1]);
    }

    Geometry::from_triangles(&triangles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cuboid_shares_corners() {
        let g = cuboid(1.0, 2.0, 3.0);
        assert_eq!(g.vertex_count(), 8);
        assert_eq!(g.faces.len(), 12);
        assert!(g.faces.iter().all(|f| f.a < 8 && f.b < 8 && f.c < 8));
    }

    #[test]
    fn cylinder_vertex_count() {
        let g = cylinder(16);
        // two rings plus the two cap centres
        assert_eq!(g.vertex_count(), 16 * 2 + 2);
        assert_eq!(g.faces.len(), 16 * 4);
    }
}
