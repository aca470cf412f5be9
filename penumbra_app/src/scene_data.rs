use penumbra_render_vulkan_3d::render::vertex::Vertex;

/// Ground quad in the XZ plane, 10 units on a side, facing +Y.
pub const GROUND: [Vertex; 6] = [
    Vertex::new([-5.0, 0.0, 5.0], [0.0, 1.0], [0.0, 1.0, 0.0]),
    Vertex::new([5.0, 0.0, 5.0], [1.0, 1.0], [0.0, 1.0, 0.0]),
    Vertex::new([5.0, 0.0, -5.0], [1.0, 0.0], [0.0, 1.0, 0.0]),
    Vertex::new([-5.0, 0.0, 5.0], [0.0, 1.0], [0.0, 1.0, 0.0]),
    Vertex::new([5.0, 0.0, -5.0], [1.0, 0.0], [0.0, 1.0, 0.0]),
    Vertex::new([-5.0, 0.0, -5.0], [0.0, 0.0], [0.0, 1.0, 0.0]),
];

/// Unit cube centred on the origin, counter-clockwise seen from outside.
#[rustfmt::skip]
pub const CUBE: [Vertex; 36] = [
    Vertex::new([-0.5, -0.5, 0.5], [0.0, 1.0], [0.0, 0.0, 1.0]),
    Vertex::new([0.5, -0.5, 0.5], [1.0, 1.0], [0.0, 0.0, 1.0]),
    Vertex::new([0.5, 0.5, 0.5], [1.0, 0.0], [0.0, 0.0, 1.0]),
    Vertex::new([-0.5, -0.5, 0.5], [0.0, 1.0], [0.0, 0.0, 1.0]),
    Vertex::new([0.5, 0.5, 0.5], [1.0, 0.0], [0.0, 0.0, 1.0]),
    Vertex::new([-0.5, 0.5, 0.5], [0.0, 0.0], [0.0, 0.0, 1.0]),
    Vertex::new([0.5, -0.5, -0.5], [0.0, 1.0], [0.0, 0.0, -1.0]),
    Vertex::new([-0.5, -0.5, -0.5], [1.0, 1.0], [0.0, 0.0, -1.0]),
    Vertex::new([-0.5, 0.5, -0.5], [1.0, 0.0], [0.0, 0.0, -1.0]),
    Vertex::new([0.5, -0.5, -0.5], [0.0, 1.0], [0.0, 0.0, -1.0]),
    Vertex::new([-0.5, 0.5, -0.5], [1.0, 0.0], [0.0, 0.0, -1.0]),
    Vertex::new([0.5, 0.5, -0.5], [0.0, 0.0], [0.0, 0.0, -1.0]),
    Vertex::new([0.5, -0.5, 0.5], [0.0, 1.0], [1.0, 0.0, 0.0]),
    Vertex::new([0.5, -0.5, -0.5], [1.0, 1.0], [1.0, 0.0, 0.0]),
    Vertex::new([0.5, 0.5, -0.5], [1.0, 0.0], [1.0, 0.0, 0.0]),
    Vertex::new([0.5, -0.5, 0.5], [0.0, 1.0], [1.0, 0.0, 0.0]),
    Vertex::new([0.5, 0.5, -0.5], [1.0, 0.0], [1.0, 0.0, 0.0]),
    Vertex::new([0.5, 0.5, 0.5], [0.0, 0.0], [1.0, 0.0, 0.0]),
    Vertex::new([-0.5, -0.5, -0.5], [0.0, 1.0], [-1.0, 0.0, 0.0]),
    Vertex::new([-0.5, -0.5, 0.5], [1.0, 1.0], [-1.0, 0.0, 0.0]),
    Vertex::new([-0.5, 0.5, 0.5], [1.0, 0.0], [-1.0, 0.0, 0.0]),
    Vertex::new([-0.5, -0.5, -0.5], [0.0, 1.0], [-1.0, 0.0, 0.0]),
    Vertex::new([-0.5, 0.5, 0.5], [1.0, 0.0], [-1.0, 0.0, 0.0]),
    Vertex::new([-0.5, 0.5, -0.5], [0.0, 0.0], [-1.0, 0.0, 0.0]),
    Vertex::new([-0.5, 0.5, 0.5], [0.0, 1.0], [0.0, 1.0, 0.0]),
    Vertex::new([0.5, 0.5, 0.5], [1.0, 1.0], [0.0, 1.0, 0.0]),
    Vertex::new([0.5, 0.5, -0.5], [1.0, 0.0], [0.0, 1.0, 0.0]),
    Vertex::new([-0.5, 0.5, 0.5], [0.0, 1.0], [0.0, 1.0, 0.0]),
    Vertex::new([0.5, 0.5, -0.5], [1.0, 0.0], [0.0, 1.0, 0.0]),
    Vertex::new([-0.5, 0.5, -0.5], [0.0, 0.0], [0.0, 1.0, 0.0]),
    Vertex::new([-0.5, -0.5, -0.5], [0.0, 1.0], [0.0, -1.0, 0.0]),
    Vertex::new([0.5, -0.5, -0.5], [1.0, 1.0], [0.0, -1.0, 0.0]),
    Vertex::new([0.5, -0.5, 0.5], [1.0, 0.0], [0.0, -1.0, 0.0]),
    Vertex::new([-0.5, -0.5, -0.5], [0.0, 1.0], [0.0, -1.0, 0.0]),
    Vertex::new([0.5, -0.5, 0.5], [1.0, 0.0], [0.0, -1.0, 0.0]),
    Vertex::new([-0.5, -0.5, 0.5], [0.0, 0.0], [0.0, -1.0, 0.0]),
];

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;

    fn outward(triangle: &[Vertex]) -> bool {
        let [a, b, c] = [0, 1, 2].map(|i| Vec3::from_array(triangle[i].position));
        let normal = Vec3::from_array(triangle[0].normal);
        (b - a).cross(c - a).dot(normal) > 0.0
            && triangle.iter().all(|v| v.normal == triangle[0].normal)
    }

    #[test]
    fn triangles_face_their_normals() {
        assert!(GROUND.chunks(3).all(outward));
        assert!(CUBE.chunks(3).all(outward));
    }

    #[test]
    fn cube_fits_the_unit_box() {
        assert!(
            CUBE.iter()
                .flat_map(|v| v.position)
                .all(|c| c.abs() == 0.5)
        );
        for axis in 0..3 {
            for sign in [-1.0f32, 1.0] {
                let faces = CUBE.iter().filter(|v| v.normal[axis] == sign).count();
                assert_eq!(faces, 6);
            }
        }
    }
}
