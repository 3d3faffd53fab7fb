/// Read / write float images as raw little-endian binary

use std::fs::File;
use std::io::{Write, Read, BufWriter, BufReader};
use std::path::Path;

use crate::types::Image;

pub fn write(data: impl Iterator<Item = f32>, path: &Path) -> std::io::Result<()> {
    let file = File::create(path)?;
    let mut buf = BufWriter::new(file);
    for datum in data {
        buf.write_all(&datum.to_le_bytes())?;
    }
    buf.flush()
}

type IORes<T> = std::io::Result<T>;
pub fn read<'a>(path: &Path) -> IORes<impl Iterator<Item = IORes<f32>> + 'a> {
    let file = File::open(path)?;
    let mut buf = BufReader::new(file);
    let mut buffer = [0; 4];

    Ok(std::iter::from_fn(move || {
        use std::io::ErrorKind::UnexpectedEof;
        match buf.read_exact(&mut buffer) {
            Ok(()) => Some(Ok(f32::from_le_bytes(buffer))),
            Err(e) if e.kind() == UnexpectedEof => None,
            Err(e) => Some(Err(e)),
        }
    }))
}

/// Write `image` in row-major order. The shape is not stored.
pub fn write_image(image: &Image, path: &Path) -> IORes<()> {
    write(image.iter().copied(), path)
}

/// Read a row-major image of known shape
pub fn read_image(path: &Path, (rows, cols): (usize, usize)) -> IORes<Image> {
    let data: Vec<f32> = read(path)?.collect::<Result<_, _>>()?;
    let found = data.len();
    Image::from_shape_vec((rows, cols), data).map_err(|_| std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("{}: expected {rows}x{cols} = {} samples, found {found}", path.display(), rows * cols),
    ))
}
