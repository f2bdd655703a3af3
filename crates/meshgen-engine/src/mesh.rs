use meshgen_contracts::data_uri::DataUri;
use meshgen_contracts::GenerationError;
use serde::Serialize;
use serde_json::Value;

const GLB_MAGIC: &[u8; 4] = b"glTF";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MeshFormat {
    Obj,
    Gltf,
    Glb,
}

/// Shape counts of a returned mesh. glTF only reports node and mesh counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MeshSummary {
    pub format: MeshFormat,
    pub vertices: usize,
    pub faces: usize,
}

/// Checks that a mesh data URI decodes to something a 3D viewer can load.
pub fn inspect_mesh(mesh_data_uri: &str) -> Result<MeshSummary, GenerationError> {
    let decoded = DataUri::parse(mesh_data_uri)?;
    let mime = decoded.mime.to_ascii_lowercase();
    if decoded.bytes.starts_with(GLB_MAGIC) || mime == "model/gltf-binary" {
        return inspect_glb(&decoded.bytes);
    }
    if mime.starts_with("model/gltf") {
        return inspect_gltf(&decoded.bytes);
    }
    inspect_obj(&decoded.bytes)
}

fn inspect_obj(bytes: &[u8]) -> Result<MeshSummary, GenerationError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| GenerationError::InvalidMesh("OBJ payload is not UTF-8 text".to_string()))?;
    let mut vertices = 0usize;
    let mut faces = 0usize;
    for line in text.lines() {
        let mut fields = line.split_whitespace();
        match fields.next() {
            Some("v") => {
                let coords = fields.take(3).filter(|item| item.parse::<f64>().is_ok()).count();
                if coords < 3 {
                    return Err(GenerationError::InvalidMesh(format!(
                        "malformed vertex line '{}'",
                        line.trim()
                    )));
                }
                vertices += 1;
            }
            Some("f") => {
                if fields.count() < 3 {
                    return Err(GenerationError::InvalidMesh(format!(
                        "face with fewer than three corners '{}'",
                        line.trim()
                    )));
                }
                faces += 1;
            }
            _ => {}
        }
    }
    if vertices == 0 || faces == 0 {
        return Err(GenerationError::InvalidMesh(format!(
            "OBJ mesh has {vertices} vertices and {faces} faces"
        )));
    }
    Ok(MeshSummary {
        format: MeshFormat::Obj,
        vertices,
        faces,
    })
}

fn inspect_gltf(bytes: &[u8]) -> Result<MeshSummary, GenerationError> {
    let payload: Value = serde_json::from_slice(bytes)
        .map_err(|err| GenerationError::InvalidMesh(format!("glTF is not valid JSON: {err}")))?;
    if !payload.get("asset").is_some_and(Value::is_object) {
        return Err(GenerationError::InvalidMesh(
            "glTF document has no `asset` object".to_string(),
        ));
    }
    let count = |key: &str| {
        payload
            .get(key)
            .and_then(Value::as_array)
            .map(Vec::len)
            .unwrap_or_default()
    };
    Ok(MeshSummary {
        format: MeshFormat::Gltf,
        vertices: count("nodes"),
        faces: count("meshes"),
    })
}

fn inspect_glb(bytes: &[u8]) -> Result<MeshSummary, GenerationError> {
    if bytes.len() < 12 || !bytes.starts_with(GLB_MAGIC) {
        return Err(GenerationError::InvalidMesh(
            "binary glTF is missing its header".to_string(),
        ));
    }
    Ok(MeshSummary {
        format: MeshFormat::Glb,
        vertices: 0,
        faces: 0,
    })
}

#[cfg(test)]
mod tests {
    use meshgen_contracts::data_uri::encode;
    use meshgen_contracts::GenerationError;

    use super::{inspect_mesh, MeshFormat};

    const CUBE_FACE: &str = "o quad\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\nvn 0 0 1\nf 1//1 2//1 3//1 4//1\n";

    #[test]
    fn counts_obj_vertices_and_faces() -> anyhow::Result<()> {
        let summary = inspect_mesh(&encode("model/obj", CUBE_FACE.as_bytes()))?;
        assert_eq!(summary.format, MeshFormat::Obj);
        assert_eq!(summary.vertices, 4);
        assert_eq!(summary.faces, 1);
        Ok(())
    }

    #[test]
    fn rejects_obj_without_faces_or_with_garbage() {
        let no_faces = inspect_mesh(&encode("model/obj", b"v 0 0 0\nv 1 1 1\n")).unwrap_err();
        assert!(matches!(no_faces, GenerationError::InvalidMesh(_)));

        let bad_vertex = inspect_mesh(&encode("model/obj", b"v 0 x 0\nf 1 1 1\n")).unwrap_err();
        assert!(bad_vertex.to_string().contains("malformed vertex"));

        let binary = inspect_mesh(&encode("model/obj", &[0xff, 0xfe, 0x00])).unwrap_err();
        assert!(matches!(binary, GenerationError::InvalidMesh(_)));
    }

    #[test]
    fn accepts_gltf_with_asset_and_glb_magic() -> anyhow::Result<()> {
        let gltf = br#"{"asset": {"version": "2.0"}, "nodes": [{}], "meshes": [{}, {}]}"#;
        let summary = inspect_mesh(&encode("model/gltf+json", gltf))?;
        assert_eq!(summary.format, MeshFormat::Gltf);
        assert_eq!(summary.faces, 2);

        let mut glb = b"glTF".to_vec();
        glb.extend_from_slice(&[2, 0, 0, 0, 12, 0, 0, 0]);
        assert_eq!(
            inspect_mesh(&encode("model/gltf-binary", &glb))?.format,
            MeshFormat::Glb
        );

        let missing_asset = inspect_mesh(&encode("model/gltf+json", b"{}")).unwrap_err();
        assert!(missing_asset.to_string().contains("asset"));
        Ok(())
    }

    #[test]
    fn undecodable_uri_is_a_decode_error() {
        let err = inspect_mesh("data:model/obj,plain").unwrap_err();
        assert!(matches!(err, GenerationError::Decode(_)));
    }
}
