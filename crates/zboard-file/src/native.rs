//! ZBoard 原生文件格式（.zboard）
//!
//! 16 字节文件头后接 Zstd 压缩的 MessagePack 数据。

use crate::document::{Document, FORMAT_VERSION};
use crate::error::FileError;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

/// 文件魔数 "ZBRD"
const MAGIC: &[u8; 4] = b"ZBRD";

/// Zstd 压缩级别（1-22）
const COMPRESSION_LEVEL: i32 = 3;

/// 文件头（16 字节）
#[derive(Debug)]
struct FileHeader {
    magic: [u8; 4],
    version: u32,
    /// 标志位（预留）
    flags: u32,
    /// 压缩后数据长度
    compressed_size: u32,
}

impl FileHeader {
    fn new(compressed_size: u32) -> Self {
        Self {
            magic: *MAGIC,
            version: FORMAT_VERSION,
            flags: 0,
            compressed_size,
        }
    }

    fn write(&self, writer: &mut impl Write) -> Result<(), std::io::Error> {
        writer.write_all(&self.magic)?;
        writer.write_all(&self.version.to_le_bytes())?;
        writer.write_all(&self.flags.to_le_bytes())?;
        writer.write_all(&self.compressed_size.to_le_bytes())?;
        Ok(())
    }

    fn read(reader: &mut impl Read) -> Result<Self, FileError> {
        let mut magic = [0u8; 4];
        read_exact(reader, &mut magic)?;

        if &magic != MAGIC {
            return Err(FileError::InvalidFormat(
                "Invalid magic number, not a ZBoard file".to_string(),
            ));
        }

        let mut buf = [0u8; 4];

        read_exact(reader, &mut buf)?;
        let version = u32::from_le_bytes(buf);

        read_exact(reader, &mut buf)?;
        let flags = u32::from_le_bytes(buf);

        read_exact(reader, &mut buf)?;
        let compressed_size = u32::from_le_bytes(buf);

        Ok(Self {
            magic,
            version,
            flags,
            compressed_size,
        })
    }
}

/// 截断的文件报告为损坏
fn read_exact(reader: &mut impl Read, buf: &mut [u8]) -> Result<(), FileError> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => FileError::Corruption("file is truncated".to_string()),
        _ => FileError::Io(e),
    })
}

/// 编码为原生格式字节
pub fn encode(document: &Document) -> Result<Vec<u8>, FileError> {
    // 按字段名编码，内部标记的枚举需要
    let msgpack_data = rmp_serde::to_vec_named(document)?;
    let compressed_data = zstd::encode_all(msgpack_data.as_slice(), COMPRESSION_LEVEL)?;
    let compressed_size = u32::try_from(compressed_data.len())
        .map_err(|_| FileError::InvalidFormat("document too large".to_string()))?;

    let mut bytes = Vec::with_capacity(16 + compressed_data.len());
    FileHeader::new(compressed_size).write(&mut bytes)?;
    bytes.extend_from_slice(&compressed_data);
    Ok(bytes)
}

/// 从原生格式字节解码
pub fn decode(mut reader: impl Read) -> Result<Document, FileError> {
    let header = FileHeader::read(&mut reader)?;

    if header.version > FORMAT_VERSION {
        return Err(FileError::UnsupportedVersion(format!(
            "File version {} is newer than supported version {}",
            header.version, FORMAT_VERSION
        )));
    }

    // 按实际读到的数据增长，不按文件头声明的长度预先分配
    let expected = u64::from(header.compressed_size);
    let mut compressed_data = Vec::new();
    reader.by_ref().take(expected).read_to_end(&mut compressed_data)?;
    if (compressed_data.len() as u64) < expected {
        return Err(FileError::Corruption(format!(
            "header declares {expected} bytes of data, found {}",
            compressed_data.len()
        )));
    }

    let msgpack_data = zstd::decode_all(compressed_data.as_slice())
        .map_err(|e| FileError::Corruption(format!("decompression failed: {e}")))?;
    let document: Document = rmp_serde::from_slice(&msgpack_data)?;
    Ok(document)
}

/// 保存文档到文件
pub fn save(document: &Document, path: &Path) -> Result<(), FileError> {
    let bytes = encode(document)?;

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&bytes)?;
    writer.flush()?;

    tracing::info!(
        "Saved {} entities to {} ({} bytes)",
        document.store.len(),
        path.display(),
        bytes.len()
    );
    Ok(())
}

/// 从文件加载文档
pub fn load(path: &Path) -> Result<Document, FileError> {
    let file = File::open(path)?;
    let document = decode(BufReader::new(file))?;

    tracing::info!(
        "Loaded {} entities from {}",
        document.store.len(),
        path.display()
    );
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use zboard_core::board::Board;
    use zboard_core::math::Point2;

    fn sample() -> Document {
        let mut board = Board::default();
        board
            .apply_json(
                r#"[
                    {"type": "point", "name": "A", "x": 0, "y": 0},
                    {"type": "point", "name": "B", "x": 30, "y": 0},
                    {"type": "point", "name": "C", "x": 10, "y": 20},
                    {"type": "triangle", "name": "T", "points": ["A", "B", "C"]},
                    {"type": "circumcenter", "point_name": "O", "points": ["A", "B", "C"]}
                ]"#,
            )
            .unwrap();
        board.add_function("sin(x)", None).unwrap();
        let mut document = Document::from_board(&board, Default::default());
        document.metadata.title = "Test Document".to_string();
        document
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("test_document.zboard");

        let document = sample();
        save(&document, &file_path).expect("Failed to save");

        let file = File::open(&file_path).expect("Failed to open");
        let mut reader = BufReader::new(file);
        let header = FileHeader::read(&mut reader).expect("Failed to read header");
        assert_eq!(&header.magic, MAGIC);
        assert_eq!(header.version, FORMAT_VERSION);

        let loaded = load(&file_path).expect("Failed to load");
        assert_eq!(loaded.metadata.title, "Test Document");
        assert_eq!(loaded, document);
        assert_eq!(
            loaded.store.point_by_name("O").unwrap().position,
            document.store.point_by_name("O").unwrap().position
        );
    }

    #[test]
    fn test_oversized_header_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("huge.zboard");
        let mut bytes = encode(&sample()).unwrap();
        bytes[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
        std::fs::write(&file_path, &bytes).unwrap();

        assert!(matches!(load(&file_path), Err(FileError::Corruption(_))));
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = b"XXXX".to_vec();
        bytes.extend_from_slice(&[0u8; 12]);
        assert!(matches!(
            decode(bytes.as_slice()),
            Err(FileError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_newer_version_rejected() {
        let mut bytes = encode(&sample()).unwrap();
        bytes[4..8].copy_from_slice(&(FORMAT_VERSION + 1).to_le_bytes());
        assert!(matches!(
            decode(bytes.as_slice()),
            Err(FileError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn test_truncated_body() {
        let bytes = encode(&sample()).unwrap();
        let truncated = &bytes[..bytes.len() - 5];
        assert!(matches!(decode(truncated), Err(FileError::Corruption(_))));

        let mut lying = bytes[..bytes.len() - 5].to_vec();
        lying[12..16].copy_from_slice(&u32::MAX.to_le_bytes());
        assert!(matches!(
            decode(lying.as_slice()),
            Err(FileError::Corruption(msg)) if msg.contains("4294967295")
        ));

        let mut empty = Document::new("empty");
        empty.view.pan(zboard_core::math::Vector2::new(1.0, 2.0));
        let decoded = decode(encode(&empty).unwrap().as_slice()).unwrap();
        assert_eq!(decoded.view.world_to_screen(&Point2::origin()), Point2::new(1.0, 2.0));
    }
}
