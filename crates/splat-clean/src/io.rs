//! PLY point cloud I/O.
//!
//! [`PlyCloud`] keeps the parsed `vertex` table exactly as read, so every
//! per-point attribute (spherical harmonics, opacity, scale, rotation and
//! whatever else a splat exporter wrote) survives a load/slice/save cycle
//! with its original property type. Coordinates are extracted once at load
//! time for the cleaning pipeline.
//!
//! Both ASCII and binary (little- and big-endian) files are supported;
//! saving reuses the encoding the cloud was read with.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use nalgebra::Point3;
use ply_rs::parser::Parser;
use ply_rs::ply::{
    Addable, DefaultElement, ElementDef, Encoding, Ply, Property, PropertyDef, PropertyType,
    ScalarType,
};
use ply_rs::writer::Writer;
use tracing::{debug, info};

use crate::error::{CleanError, CleanResult};
use crate::pipeline::CleanOutput;
use crate::tracing_ext::{OperationTimer, log_io_operation};
use crate::types::PointSet;

const VERTEX: &str = "vertex";
const COLOR_PROPERTIES: [&str; 3] = ["red", "green", "blue"];

/// A table of per-point records that can be cut down to a subset of rows.
pub trait AttributeTable {
    /// Number of rows.
    fn row_count(&self) -> usize;

    /// A new table holding exactly the given rows, in ascending row order.
    ///
    /// Fails with `EmptySelection` for an empty slice and with
    /// `IndexOutOfRange` when an index is not a row of this table.
    fn slice_by_indices(&self, indices: &[usize]) -> CleanResult<Self>
    where
        Self: Sized;
}

/// A parsed PLY point cloud.
pub struct PlyCloud {
    ply: Ply<DefaultElement>,
    coords: Vec<Point3<f64>>,
}

impl std::fmt::Debug for PlyCloud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlyCloud")
            .field("rows", &self.coords.len())
            .field("encoding", &self.ply.header.encoding)
            .field("properties", &self.property_names())
            .finish()
    }
}

impl PlyCloud {
    /// Load a cloud from a PLY file.
    pub fn load(path: impl AsRef<Path>) -> CleanResult<Self> {
        let path = path.as_ref();
        let _timer = OperationTimer::new("load_ply");

        let file = File::open(path).map_err(|e| {
            log_io_operation("load", path, 0, false);
            CleanError::io_read(path, e)
        })?;
        let mut reader = BufReader::new(file);

        let cloud = Self::parse(&mut reader, path)?;
        log_io_operation("load", path, cloud.row_count(), true);
        Ok(cloud)
    }

    /// Read a cloud from any buffered reader.
    pub fn read<R: BufRead>(reader: &mut R) -> CleanResult<Self> {
        Self::parse(reader, Path::new("<stream>"))
    }

    fn parse<R: BufRead>(reader: &mut R, path: &Path) -> CleanResult<Self> {
        let parser = Parser::<DefaultElement>::new();
        let ply = parser
            .read_ply(reader)
            .map_err(|e| CleanError::parse_error(path, format!("PLY parse error: {e}")))?;
        Self::from_ply(ply)
    }

    /// Wrap an already parsed PLY, validating its vertex table.
    pub fn from_ply(ply: Ply<DefaultElement>) -> CleanResult<Self> {
        if !ply.header.elements.contains_key(VERTEX) {
            return Err(CleanError::MissingVertexElement);
        }
        let rows = ply.payload.get(VERTEX).map(Vec::as_slice).unwrap_or(&[]);
        if rows.is_empty() {
            return Err(CleanError::empty_cloud("the vertex element has no rows"));
        }

        let coords = rows
            .iter()
            .enumerate()
            .map(|(row, element)| {
                Ok(Point3::new(
                    coordinate(element, row, "x")?,
                    coordinate(element, row, "y")?,
                    coordinate(element, row, "z")?,
                ))
            })
            .collect::<CleanResult<Vec<_>>>()?;

        debug!(
            target: "splat_clean::io",
            rows = coords.len(),
            encoding = ?ply.header.encoding,
            "PLY parsed"
        );

        Ok(Self { ply, coords })
    }

    /// Vertex coordinates in row order.
    pub fn coordinates(&self) -> &[Point3<f64>] {
        &self.coords
    }

    /// The identity-mapped point set of this cloud.
    pub fn point_set(&self) -> PointSet {
        PointSet::from_coordinates(self.coords.clone())
    }

    /// Encoding the cloud was read with and will be saved with.
    pub fn encoding(&self) -> Encoding {
        self.ply.header.encoding
    }

    /// Vertex property names in declaration order.
    pub fn property_names(&self) -> Vec<String> {
        self.vertex_def()
            .map(|def| def.properties.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Elements other than `vertex`; these are not carried into sliced output.
    pub fn dropped_elements(&self) -> Vec<String> {
        self.ply
            .header
            .elements
            .keys()
            .filter(|name| name.as_str() != VERTEX)
            .cloned()
            .collect()
    }

    pub fn comments(&self) -> &[String] {
        &self.ply.header.comments
    }

    /// Whether rows carry `red`, `green` and `blue`.
    pub fn has_color(&self) -> bool {
        self.vertex_def()
            .is_some_and(|def| COLOR_PROPERTIES.iter().all(|p| def.properties.contains_key(*p)))
    }

    /// Raw property values of one row.
    pub fn row(&self, index: usize) -> Option<&DefaultElement> {
        self.rows().get(index)
    }

    /// Write the cloud to `path` with its own encoding.
    pub fn save(&mut self, path: impl AsRef<Path>) -> CleanResult<()> {
        let path = path.as_ref();
        let rows = self.row_count();
        write_ply(&mut self.ply, path).inspect_err(|_| log_io_operation("save", path, rows, false))?;
        log_io_operation("save", path, rows, true);
        Ok(())
    }

    fn rows(&self) -> &[DefaultElement] {
        self.ply.payload.get(VERTEX).map(Vec::as_slice).unwrap_or(&[])
    }

    fn vertex_def(&self) -> Option<&ElementDef> {
        self.ply.header.elements.get(VERTEX)
    }

    /// An empty PLY with this cloud's encoding, comments and obj_info lines.
    fn derived_ply(&self) -> Ply<DefaultElement> {
        let mut ply = Ply::<DefaultElement>::new();
        ply.header.encoding = self.ply.header.encoding;
        ply.header.comments = self.ply.header.comments.clone();
        ply.header.obj_infos = self.ply.header.obj_infos.clone();
        ply
    }
}

impl AttributeTable for PlyCloud {
    fn row_count(&self) -> usize {
        self.coords.len()
    }

    fn slice_by_indices(&self, indices: &[usize]) -> CleanResult<Self> {
        if indices.is_empty() {
            return Err(CleanError::EmptySelection);
        }
        let row_count = self.row_count();
        if let Some(&index) = indices.iter().find(|&&i| i >= row_count) {
            return Err(CleanError::IndexOutOfRange { index, row_count });
        }

        let mut order = indices.to_vec();
        order.sort_unstable();
        order.dedup();

        let rows = self.rows();
        let payload: Vec<DefaultElement> = order.iter().map(|&i| rows[i].clone()).collect();
        let coords = order.iter().map(|&i| self.coords[i]).collect();

        let mut ply = self.derived_ply();
        if let Some(def) = self.vertex_def() {
            ply.header.elements.add(def.clone());
        }
        ply.payload.insert(VERTEX.to_string(), payload);
        ply.make_consistent()
            .map_err(|e| CleanError::parse_error("<slice>", format!("PLY consistency error: {e:?}")))?;

        Ok(Self { ply, coords })
    }
}

/// Save the rows kept by a cleaning run with every attribute intact.
///
/// Refuses with `MappingInvalidated` once the run applied a resampling
/// step. Returns the number of rows written.
pub fn save_gs_preserving(
    source: &PlyCloud,
    output: &CleanOutput,
    path: impl AsRef<Path>,
) -> CleanResult<usize> {
    let indices = output.require_mapping()?;
    let mut sliced = source.slice_by_indices(indices)?;
    sliced.save(path.as_ref())?;

    info!(
        target: "splat_clean::io",
        path = %path.as_ref().display(),
        rows = sliced.row_count(),
        dropped = ?source.dropped_elements(),
        "Saved attribute-preserving cloud"
    );
    Ok(sliced.row_count())
}

/// Save coordinates only, plus colour when the source has it.
///
/// Always allowed, including after resampling; each point takes the
/// colour of the source row its index points at.
pub fn save_preview(
    points: &PointSet,
    source: &PlyCloud,
    path: impl AsRef<Path>,
) -> CleanResult<usize> {
    let path = path.as_ref();
    if points.is_empty() {
        return Err(CleanError::EmptySelection);
    }
    let with_color = source.has_color();

    let mut vertex_def = ElementDef::new(VERTEX.to_string());
    for name in ["x", "y", "z"] {
        vertex_def.properties.add(PropertyDef::new(
            name.to_string(),
            PropertyType::Scalar(ScalarType::Float),
        ));
    }
    if with_color {
        for name in COLOR_PROPERTIES {
            vertex_def.properties.add(PropertyDef::new(
                name.to_string(),
                PropertyType::Scalar(ScalarType::UChar),
            ));
        }
    }

    let mut payload = Vec::with_capacity(points.len());
    for (p, &index) in points.coords().iter().zip(points.indices()) {
        let mut element = DefaultElement::new();
        element.insert("x".to_string(), Property::Float(p.x as f32));
        element.insert("y".to_string(), Property::Float(p.y as f32));
        element.insert("z".to_string(), Property::Float(p.z as f32));
        if with_color {
            let rgb = source.row(index).map(color_of).unwrap_or([255, 255, 255]);
            for (name, value) in COLOR_PROPERTIES.iter().zip(rgb) {
                element.insert((*name).to_string(), Property::UChar(value));
            }
        }
        payload.push(element);
    }

    let mut ply = source.derived_ply();
    ply.header.elements.add(vertex_def);
    ply.payload.insert(VERTEX.to_string(), payload);

    write_ply(&mut ply, path).inspect_err(|_| log_io_operation("save_preview", path, 0, false))?;
    log_io_operation("save_preview", path, points.len(), true);
    Ok(points.len())
}

fn write_ply(ply: &mut Ply<DefaultElement>, path: &Path) -> CleanResult<()> {
    ply.make_consistent().map_err(|e| {
        CleanError::io_write(
            path,
            std::io::Error::other(format!("PLY consistency error: {e:?}")),
        )
    })?;

    let file = File::create(path).map_err(|e| CleanError::io_write(path, e))?;
    let mut writer = BufWriter::new(file);

    Writer::new().write_ply(&mut writer, ply).map_err(|e| {
        CleanError::io_write(path, std::io::Error::other(format!("PLY write error: {e}")))
    })?;

    writer.flush().map_err(|e| CleanError::io_write(path, e))
}

/// Numeric value of a coordinate property, whatever its scalar type.
fn coordinate(element: &DefaultElement, row: usize, property: &'static str) -> CleanResult<f64> {
    match element.get(property) {
        Some(Property::Float(v)) => Ok(f64::from(*v)),
        Some(Property::Double(v)) => Ok(*v),
        Some(Property::Int(v)) => Ok(f64::from(*v)),
        Some(Property::UInt(v)) => Ok(f64::from(*v)),
        Some(Property::Short(v)) => Ok(f64::from(*v)),
        Some(Property::UShort(v)) => Ok(f64::from(*v)),
        Some(Property::Char(v)) => Ok(f64::from(*v)),
        Some(Property::UChar(v)) => Ok(f64::from(*v)),
        _ => Err(CleanError::MissingCoordinate { row, property }),
    }
}

fn color_of(element: &DefaultElement) -> [u8; 3] {
    COLOR_PROPERTIES.map(|name| channel(element.get(name)))
}

/// A colour channel as u8; float channels are taken to be in [0, 1].
fn channel(prop: Option<&Property>) -> u8 {
    match prop {
        Some(Property::UChar(v)) => *v,
        Some(Property::Char(v)) => (*v).max(0) as u8,
        Some(Property::UShort(v)) => (*v).min(255) as u8,
        Some(Property::Short(v)) => (*v).clamp(0, 255) as u8,
        Some(Property::UInt(v)) => (*v).min(255) as u8,
        Some(Property::Int(v)) => (*v).clamp(0, 255) as u8,
        Some(Property::Float(v)) => (v * 255.0).clamp(0.0, 255.0) as u8,
        Some(Property::Double(v)) => (v * 255.0).clamp(0.0, 255.0) as u8,
        _ => 255,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    const ASCII_SPLAT: &str = "ply
format ascii 1.0
comment exported by a splat trainer
obj_info scene 7
element vertex 4
property float x
property float y
property float z
property float f_dc_0
property float opacity
property uchar red
property uchar green
property uchar blue
element face 1
property list uchar int vertex_indices
end_header
0 0 0 0.5 -1.25 10 20 30
1 0 0 0.25 2.5 40 50 60
0 1 0 -0.75 0.125 70 80 90
0 0 1 1.5 3 100 110 120
3 0 1 2
";

    fn ascii_cloud() -> PlyCloud {
        PlyCloud::read(&mut Cursor::new(ASCII_SPLAT.as_bytes())).unwrap()
    }

    fn binary_bytes() -> Vec<u8> {
        let mut bytes = b"ply\nformat binary_little_endian 1.0\nelement vertex 3\n\
property float x\nproperty float y\nproperty float z\nproperty float opacity\nend_header\n"
            .to_vec();
        for row in [[0.5f32, 1.0, 1.5, 0.1], [2.0, 2.5, 3.0, 0.2], [-1.0, -2.0, -3.0, 0.3]] {
            for v in row {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        bytes
    }

    #[test]
    fn test_read_ascii() {
        let cloud = ascii_cloud();
        assert_eq!(cloud.row_count(), 4);
        assert_eq!(cloud.coordinates()[3], Point3::new(0.0, 0.0, 1.0));
        assert_eq!(
            cloud.property_names(),
            vec!["x", "y", "z", "f_dc_0", "opacity", "red", "green", "blue"]
        );
        assert_eq!(cloud.dropped_elements(), vec!["face".to_string()]);
        assert!(cloud.has_color());
        assert_eq!(cloud.encoding(), Encoding::Ascii);

        let set = cloud.point_set();
        assert_eq!(set.indices(), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_missing_vertex_element() {
        let text = "ply\nformat ascii 1.0\nelement face 0\nproperty list uchar int vertex_indices\nend_header\n";
        let err = PlyCloud::read(&mut Cursor::new(text.as_bytes())).unwrap_err();
        assert!(matches!(err, CleanError::MissingVertexElement));
    }

    #[test]
    fn test_empty_vertex_element() {
        let text = "ply\nformat ascii 1.0\nelement vertex 0\nproperty float x\nproperty float y\nproperty float z\nend_header\n";
        let err = PlyCloud::read(&mut Cursor::new(text.as_bytes())).unwrap_err();
        assert!(matches!(err, CleanError::EmptyCloud { .. }));
    }

    #[test]
    fn test_missing_coordinate() {
        let text = "ply\nformat ascii 1.0\nelement vertex 1\nproperty float x\nproperty float y\nend_header\n1 2\n";
        let err = PlyCloud::read(&mut Cursor::new(text.as_bytes())).unwrap_err();
        assert!(matches!(
            err,
            CleanError::MissingCoordinate { row: 0, property: "z" }
        ));
    }

    #[test]
    fn test_slice_keeps_rows_and_header() {
        let cloud = ascii_cloud();
        let sliced = cloud.slice_by_indices(&[3, 1]).unwrap();

        assert_eq!(sliced.row_count(), 2);
        assert_eq!(sliced.row(0), cloud.row(1));
        assert_eq!(sliced.row(1), cloud.row(3));
        assert_eq!(sliced.coordinates()[1], Point3::new(0.0, 0.0, 1.0));
        assert_eq!(sliced.comments(), cloud.comments());
        assert_eq!(sliced.property_names(), cloud.property_names());
        assert!(sliced.dropped_elements().is_empty());
    }

    #[test]
    fn test_slice_errors() {
        let cloud = ascii_cloud();
        assert!(matches!(
            cloud.slice_by_indices(&[]),
            Err(CleanError::EmptySelection)
        ));
        assert!(matches!(
            cloud.slice_by_indices(&[0, 4]),
            Err(CleanError::IndexOutOfRange { index: 4, row_count: 4 })
        ));
    }

    #[test]
    fn test_save_and_reload_preserves_attributes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("subset.ply");

        let cloud = ascii_cloud();
        let mut sliced = cloud.slice_by_indices(&[0, 2]).unwrap();
        sliced.save(&path).unwrap();

        let reloaded = PlyCloud::load(&path).unwrap();
        assert_eq!(reloaded.row_count(), 2);
        assert_eq!(reloaded.row(0), cloud.row(0));
        assert_eq!(reloaded.row(1), cloud.row(2));
        assert_eq!(reloaded.comments(), cloud.comments());
        assert!(reloaded.dropped_elements().is_empty());
    }

    #[test]
    fn test_binary_stays_binary() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("in.ply");
        let output = dir.path().join("out.ply");
        std::fs::write(&input, binary_bytes()).unwrap();

        let cloud = PlyCloud::load(&input).unwrap();
        assert_eq!(cloud.encoding(), Encoding::BinaryLittleEndian);
        assert_eq!(cloud.coordinates()[2], Point3::new(-1.0, -2.0, -3.0));

        let mut sliced = cloud.slice_by_indices(&[2]).unwrap();
        sliced.save(&output).unwrap();

        let written = std::fs::read(&output).unwrap();
        let header_end = b"end_header\n";
        let pos = written
            .windows(header_end.len())
            .position(|w| w == header_end)
            .unwrap();
        let header = std::str::from_utf8(&written[..pos]).unwrap();
        assert!(header.contains("binary_little_endian"));
        // One row of four f32 values follows the header
        assert_eq!(written.len() - pos - header_end.len(), 16);

        let reloaded = PlyCloud::load(&output).unwrap();
        assert_eq!(reloaded.row(0), cloud.row(2));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempdir().unwrap();
        let err = PlyCloud::load(dir.path().join("nope.ply")).unwrap_err();
        assert!(matches!(err, CleanError::IoRead { .. }));
    }

    #[test]
    fn test_preview_takes_color_from_source_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("preview.ply");
        let cloud = ascii_cloud();

        let points = PointSet::new(
            vec![Point3::new(0.5, 0.5, 0.5), Point3::new(2.0, 2.0, 2.0)],
            vec![1, 3],
        )
        .unwrap();
        assert_eq!(save_preview(&points, &cloud, &path).unwrap(), 2);

        let preview = PlyCloud::load(&path).unwrap();
        assert_eq!(preview.property_names(), vec!["x", "y", "z", "red", "green", "blue"]);
        assert_eq!(preview.coordinates()[0], Point3::new(0.5, 0.5, 0.5));
        let row = preview.row(1).unwrap();
        assert_eq!(row.get("red"), Some(&Property::UChar(100)));
        assert_eq!(row.get("blue"), Some(&Property::UChar(120)));
    }

    #[test]
    fn test_preview_without_color() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("preview.ply");
        std::fs::write(dir.path().join("in.ply"), binary_bytes()).unwrap();
        let cloud = PlyCloud::load(dir.path().join("in.ply")).unwrap();

        save_preview(&cloud.point_set(), &cloud, &path).unwrap();
        let preview = PlyCloud::load(&path).unwrap();
        assert_eq!(preview.property_names(), vec!["x", "y", "z"]);
        assert_eq!(preview.row_count(), 3);

        assert!(matches!(
            save_preview(&PointSet::default(), &cloud, &path),
            Err(CleanError::EmptySelection)
        ));
    }

    #[test]
    fn test_channel_conversion() {
        assert_eq!(channel(Some(&Property::UChar(12))), 12);
        assert_eq!(channel(Some(&Property::Float(1.5))), 255);
        assert_eq!(channel(Some(&Property::Int(-4))), 0);
        assert_eq!(channel(None), 255);
    }
}
