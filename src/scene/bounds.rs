use glam::Vec3;

/// Bounding sphere representation.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HalaBoundingSphere {
  pub center: [f32; 3],
  pub radius: f32,
}

/// Implementation of HalaBoundingSphere.
impl HalaBoundingSphere {

  /// Create a new HalaBoundingSphere instance.
  /// param center: The center of the sphere.
  /// param radius: The radius of the sphere.
  /// return: The new HalaBoundingSphere instance.
  pub fn new(center: [f32; 3], radius: f32) -> Self {
    Self { center, radius }
  }

  /// Create the sphere around the given points.
  /// The center is the middle of the points' AABB.
  /// param points: The points.
  /// return: The sphere, None if there is no point.
  pub fn from_points<I: IntoIterator<Item = Vec3>>(points: I) -> Option<Self> {
    let points: Vec<Vec3> = points.into_iter().collect();
    let first = *points.first()?;
    let (min, max) = points.iter().fold((first, first), |(min, max), p| (min.min(*p), max.max(*p)));
    let center = (min + max) * 0.5;
    let radius = points.iter().map(|p| p.distance(center)).fold(0.0f32, f32::max);
    Some(Self::new(center.into(), radius))
  }

  pub fn get_center(&self) -> Vec3 {
    Vec3::from_array(self.center)
  }

  /// Check whether the point is inside the sphere.
  /// param point: The point.
  /// return: True if the point is inside.
  pub fn contains_point(&self, point: Vec3) -> bool {
    point.distance(self.get_center()) <= self.radius
  }

  /// Grows the sphere to include the given sphere.
  /// param other: The sphere to include.
  pub fn encapsulate_sphere(&mut self, other: &HalaBoundingSphere) {
    let center = self.get_center();
    let other_center = other.get_center();
    let offset = other_center - center;
    let distance = offset.length();

    // One sphere already contains the other.
    if distance + other.radius <= self.radius {
      return;
    }
    if distance + self.radius <= other.radius {
      *self = *other;
      return;
    }

    let radius = (distance + self.radius + other.radius) * 0.5;
    let new_center = center + offset * ((radius - self.radius) / distance);
    self.center = new_center.into();
    self.radius = radius;
  }

  /// Merge the spheres.
  /// param spheres: The spheres.
  /// return: The smallest sphere of this construction holding all of them, None if there is none.
  pub fn merge_all<'a, I: IntoIterator<Item = &'a HalaBoundingSphere>>(spheres: I) -> Option<Self> {
    let mut iter = spheres.into_iter();
    let mut merged = *iter.next()?;
    for sphere in iter {
      merged.encapsulate_sphere(sphere);
    }
    Some(merged)
  }

}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sphere_from_points() {
    let sphere = HalaBoundingSphere::from_points([Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0)]).unwrap();
    assert_eq!(sphere.center, [0.0, 0.0, 0.0]);
    assert_eq!(sphere.radius, 1.0);
    assert!(sphere.contains_point(Vec3::new(1.0, 0.0, 0.0)));
    assert!(sphere.contains_point(Vec3::new(0.0, 0.5, -0.5)));
    assert!(!sphere.contains_point(Vec3::new(0.0, 1.1, 0.0)));
    assert!(HalaBoundingSphere::from_points(std::iter::empty()).is_none());
  }

  #[test]
  fn encapsulate_disjoint_spheres() {
    let mut a = HalaBoundingSphere::new([-2.0, 0.0, 0.0], 1.0);
    a.encapsulate_sphere(&HalaBoundingSphere::new([2.0, 0.0, 0.0], 1.0));
    assert!((a.radius - 3.0).abs() < 1e-6);
    assert!(a.get_center().length() < 1e-6);
  }

  #[test]
  fn encapsulate_contained_sphere_is_noop() {
    let mut a = HalaBoundingSphere::new([0.0, 0.0, 0.0], 5.0);
    a.encapsulate_sphere(&HalaBoundingSphere::new([1.0, 0.0, 0.0], 1.0));
    assert_eq!(a, HalaBoundingSphere::new([0.0, 0.0, 0.0], 5.0));

    let mut b = HalaBoundingSphere::new([1.0, 0.0, 0.0], 1.0);
    b.encapsulate_sphere(&HalaBoundingSphere::new([0.0, 0.0, 0.0], 5.0));
    assert_eq!(b.radius, 5.0);
  }

  #[test]
  fn merged_sphere_contains_inputs() {
    let spheres = [
      HalaBoundingSphere::new([0.0, 0.0, 0.0], 1.0),
      HalaBoundingSphere::new([0.0, 3.0, 0.0], 0.5),
      HalaBoundingSphere::new([4.0, 0.0, 0.0], 2.0),
    ];
    let merged = HalaBoundingSphere::merge_all(spheres.iter()).unwrap();
    for sphere in spheres.iter() {
      assert!(sphere.get_center().distance(merged.get_center()) + sphere.radius <= merged.radius + 1e-4);
    }
  }
}
