//! Material property encoding
//!
//! Properties come from a closed, versioned table of type codes. Each code
//! has a value kind and a source on the resolved surface; the encoder walks
//! the table in code order and keeps the properties that are present.

use m3dkit_core::{Diagnostics, PbrSurface, Rgba, SceneMaterial, TextureRef};

use crate::model::{Color, MaterialProperty, PropertyValue};
use crate::pool::{Pool, StringPool};
use crate::quantize::Quality;

/// How a property value is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Color,
    /// Scalar replicated into a pooled color
    Grayscale,
    Float,
    Byte,
    /// Texture name
    Map,
}

/// Where a property's value comes from
#[derive(Clone, Copy)]
enum Source {
    /// Base color with the effective alpha
    Diffuse,
    /// Illumination model derived from specular, metallic and alpha
    Illumination,
    Scalar(fn(&PbrSurface) -> f64),
    Tint(fn(&PbrSurface) -> Option<Rgba>),
    Texture(fn(&PbrSurface) -> Option<&TextureRef>),
}

/// One row of the property table
#[derive(Clone, Copy)]
pub struct PropertyDef {
    pub code: u8,
    pub kind: PropertyKind,
    /// Key used by the textual format
    pub key: &'static str,
    source: Source,
}

const fn def(code: u8, kind: PropertyKind, key: &'static str, source: Source) -> PropertyDef {
    PropertyDef { code, kind, key, source }
}

/// Property table in code order
pub static PROPERTIES: &[PropertyDef] = &[
    def(0, PropertyKind::Color, "Kd", Source::Diffuse),
    def(1, PropertyKind::Grayscale, "Ka", Source::Scalar(|s| s.metallic)),
    def(2, PropertyKind::Grayscale, "Ks", Source::Scalar(|s| s.specular)),
    def(3, PropertyKind::Color, "Ns", Source::Tint(|s| s.specular_tint)),
    def(4, PropertyKind::Color, "Ke", Source::Tint(|s| s.emission)),
    def(5, PropertyKind::Grayscale, "Tf", Source::Scalar(|s| s.transmission)),
    def(6, PropertyKind::Float, "Km", Source::Scalar(|s| s.normalmap_strength)),
    def(7, PropertyKind::Float, "d", Source::Scalar(|s| s.alpha)),
    def(8, PropertyKind::Byte, "il", Source::Illumination),
    def(64, PropertyKind::Float, "Pr", Source::Scalar(|s| s.roughness)),
    def(65, PropertyKind::Float, "Pm", Source::Scalar(|s| s.metallic)),
    def(66, PropertyKind::Float, "Ps", Source::Scalar(|s| s.sheen)),
    def(67, PropertyKind::Float, "Ni", Source::Scalar(|s| s.ior)),
    def(128, PropertyKind::Map, "map_Kd", Source::Texture(|s| s.base_color_texture.as_ref())),
    def(130, PropertyKind::Map, "map_Ks", Source::Texture(|s| s.specular_texture.as_ref())),
    def(133, PropertyKind::Map, "map_Tf", Source::Texture(|s| s.transmission_texture.as_ref())),
    def(134, PropertyKind::Map, "map_Km", Source::Texture(|s| s.normalmap_texture.as_ref())),
    def(135, PropertyKind::Map, "map_D", Source::Texture(|s| s.alpha_texture.as_ref())),
    def(192, PropertyKind::Map, "map_Pr", Source::Texture(|s| s.roughness_texture.as_ref())),
    def(193, PropertyKind::Map, "map_Pm", Source::Texture(|s| s.metallic_texture.as_ref())),
    def(195, PropertyKind::Map, "map_Ni", Source::Texture(|s| s.ior_texture.as_ref())),
];

const DIFFUSE_MAP: u8 = 128;

/// Look up a property code
pub fn property(code: u8) -> Option<&'static PropertyDef> {
    PROPERTIES.iter().find(|p| p.code == code)
}

/// Effective alpha: the alpha value unless it is 0 or 1, else base color alpha
pub fn effective_alpha(surface: &PbrSurface) -> f64 {
    if surface.alpha != 0.0 && surface.alpha != 1.0 {
        surface.alpha
    } else {
        surface.base_color[3]
    }
}

/// Illumination model byte
pub fn illumination(surface: &PbrSurface) -> u8 {
    let alpha = effective_alpha(surface);
    if surface.specular == 0.0 {
        1
    } else if surface.metallic != 0.0 {
        if alpha != 1.0 {
            6
        } else {
            3
        }
    } else if alpha != 1.0 {
        9
    } else {
        2
    }
}

/// A texture referenced by an encoded material
#[derive(Debug, Clone, PartialEq)]
pub struct TextureUse {
    /// String index of the texture name
    pub name: u32,
    pub texture: TextureRef,
}

/// Result of encoding one material
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodedMaterial {
    pub properties: Vec<MaterialProperty>,
    pub textures: Vec<TextureUse>,
}

impl EncodedMaterial {
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}

/// Interns material values into the color and string pools
pub struct MaterialEncoder<'a> {
    pub quality: Quality,
    pub colors: &'a mut Pool<Color>,
    pub strings: &'a mut StringPool,
}

impl MaterialEncoder<'_> {
    fn color(&mut self, rgba: Rgba) -> u32 {
        self.colors.intern(Color(rgba.map(|c| self.quality.round(c))))
    }

    fn texture(&mut self, texture: &TextureRef, out: &mut EncodedMaterial) -> Option<u32> {
        if texture.name.is_empty() {
            return None;
        }
        let name = self.strings.intern(&texture.name);
        out.textures.push(TextureUse {
            name,
            texture: texture.clone(),
        });
        Some(name)
    }

    /// Encode one material; an empty result means the material is dropped
    pub fn encode(&mut self, material: &SceneMaterial, diagnostics: &mut Diagnostics) -> EncodedMaterial {
        let mut out = EncodedMaterial::default();

        let Some(surface) = material.surface.as_ref() else {
            diagnostics.error(format!(
                "Material '{}' does not use a PBR surface, not parsing.",
                material.name
            ));
            if let Some(name) = material.fallback_texture.as_ref().and_then(|t| self.texture(t, &mut out)) {
                out.properties.push(MaterialProperty {
                    code: DIFFUSE_MAP,
                    value: PropertyValue::Map(name),
                });
            }
            return out;
        };

        let mut illumination_model = None;
        for prop in PROPERTIES {
            let value = match prop.source {
                Source::Diffuse => {
                    let d = effective_alpha(surface);
                    (d != 0.0).then(|| {
                        let [r, g, b, _] = surface.base_color;
                        PropertyValue::Color(self.color([r, g, b, d]))
                    })
                }
                Source::Illumination => {
                    illumination_model = Some(out.properties.len());
                    Some(PropertyValue::Byte(illumination(surface)))
                }
                Source::Scalar(get) => {
                    let v = get(surface);
                    match prop.kind {
                        _ if v == 0.0 => None,
                        PropertyKind::Grayscale => Some(PropertyValue::Color(self.color([v, v, v, 1.0]))),
                        _ => Some(PropertyValue::Float(self.quality.round(v))),
                    }
                }
                Source::Tint(get) => get(surface)
                    .filter(|c| c.iter().any(|v| *v != 0.0))
                    .map(|c| PropertyValue::Color(self.color(c))),
                Source::Texture(get) => {
                    let texture = get(surface).filter(|t| !t.name.is_empty()).or_else(|| {
                        (prop.code == DIFFUSE_MAP)
                            .then_some(material.fallback_texture.as_ref())
                            .flatten()
                    });
                    texture
                        .and_then(|t| self.texture(t, &mut out))
                        .map(PropertyValue::Map)
                }
            };
            if let Some(value) = value {
                out.properties.push(MaterialProperty { code: prop.code, value });
            }
        }

        // the illumination model alone does not keep a material alive
        if out.properties.len() == 1 && illumination_model.is_some() {
            out.properties.clear();
        }
        out
    }
}
