//! Record types of the federal registry and the consolidated document.
//!
//! The registry distinguishes "absent" from "zero" throughout, so every
//! optional numeric or string field is an `Option`, never a sentinel.

use serde::{Deserialize, Serialize};

use crate::error::{RegistryError, Result};

const CNPJ_LEN: usize = 14;
const BASE_LEN: usize = 8;

/// A validated CNPJ: exactly 14 ASCII digits. The first 8 digits (the
/// base) identify the legal entity; the remainder identifies the branch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Cnpj(String);

impl Cnpj {
    pub fn new(digits: &str) -> Result<Self> {
        if digits.len() != CNPJ_LEN || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(RegistryError::Validation(format!(
                "cnpj must be {CNPJ_LEN} digits, got {digits:?}"
            )));
        }
        Ok(Self(digits.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base key shared by every branch and partner of the legal entity.
    pub fn base(&self) -> &str {
        &self.0[..BASE_LEN]
    }

    /// Branch suffix (order + check digits).
    pub fn branch(&self) -> &str {
        &self.0[BASE_LEN..]
    }
}

impl std::fmt::Display for Cnpj {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Legal-entity identity, one row per base key in the source file.
/// Re-staged wholesale on every sighting (last write wins).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BaseRecord {
    pub razao_social: Option<String>,
    pub natureza_juridica: Option<i32>,
    pub qualificacao_do_responsavel: Option<i32>,
    pub capital_social: Option<f64>,
    pub codigo_porte: Option<i32>,
    pub porte: Option<String>,
    pub ente_federativo_responsavel: Option<String>,
}

/// Establishment-level facts, one row per full key. This is the facet
/// that seeds one consolidated document per branch.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BranchRecord {
    pub identificador_matriz_filial: Option<i32>,
    pub nome_fantasia: Option<String>,
    pub situacao_cadastral: Option<i32>,
    pub data_situacao_cadastral: Option<String>,
    pub data_inicio_atividade: Option<String>,
    pub cnae_fiscal: Option<i64>,
    pub logradouro: Option<String>,
    pub numero: Option<String>,
    pub bairro: Option<String>,
    pub cep: Option<String>,
    pub municipio: Option<String>,
    pub uf: Option<String>,
    pub ddd_telefone_1: Option<String>,
    pub correio_eletronico: Option<String>,
}

/// One partner sighting. Zero or more per base key; the staged sequence
/// keeps first-observation order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PartnerRecord {
    pub identificador_de_socio: Option<i32>,
    pub nome_socio: Option<String>,
    pub cnpj_cpf_do_socio: Option<String>,
    pub codigo_qualificacao_socio: Option<i32>,
    pub qualificacao_socio: Option<String>,
    pub data_entrada_sociedade: Option<String>,
    pub codigo_pais: Option<i32>,
    pub pais: Option<String>,
    pub cpf_representante_legal: Option<String>,
    pub nome_representante_legal: Option<String>,
    pub codigo_qualificacao_representante_legal: Option<i32>,
    pub qualificacao_representante_legal: Option<String>,
    pub codigo_faixa_etaria: Option<i32>,
    pub faixa_etaria: Option<String>,
}

/// Simples/MEI enrollment facts. Singleton-or-absent per base key; an
/// absent record consolidates as unset fields, not an error.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TaxRecord {
    pub opcao_pelo_simples: Option<bool>,
    pub data_opcao_pelo_simples: Option<String>,
    pub data_exclusao_do_simples: Option<String>,
    pub opcao_pelo_mei: Option<bool>,
    pub data_opcao_pelo_mei: Option<String>,
    pub data_exclusao_do_mei: Option<String>,
}

/// The consolidated per-branch document, shaped into the registry's
/// public schema. Immutable once assembled; unit of bulk load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub cnpj: String,
    #[serde(flatten)]
    pub branch: BranchRecord,
    #[serde(flatten)]
    pub base: BaseRecord,
    pub qsa: Vec<PartnerRecord>,
    #[serde(flatten)]
    pub taxes: TaxRecord,
}

impl Company {
    pub fn new(
        cnpj: &Cnpj,
        branch: BranchRecord,
        base: BaseRecord,
        qsa: Vec<PartnerRecord>,
        taxes: Option<TaxRecord>,
    ) -> Self {
        Self {
            cnpj: cnpj.as_str().to_string(),
            branch,
            base,
            qsa,
            taxes: taxes.unwrap_or_default(),
        }
    }
}

/// One page of search results: the documents plus the keyset cursor of
/// the last row. An empty page carries no cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    pub data: Vec<serde_json::Value>,
    pub cursor: Option<String>,
}

impl Page {
    pub fn empty() -> Self {
        Self { data: Vec::new(), cursor: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cnpj_splits_base_and_branch() {
        let cnpj = Cnpj::new("33683111000280").unwrap();
        assert_eq!(cnpj.base(), "33683111");
        assert_eq!(cnpj.branch(), "000280");
    }

    #[test]
    fn cnpj_rejects_bad_input() {
        assert!(Cnpj::new("123").is_err());
        assert!(Cnpj::new("3368311100028x").is_err());
        assert!(Cnpj::new("336831110002800").is_err());
    }

    #[test]
    fn company_flattens_facets_into_one_object() {
        let cnpj = Cnpj::new("12345678000195").unwrap();
        let base = BaseRecord {
            razao_social: Some("ACME LTDA".into()),
            ..Default::default()
        };
        let branch = BranchRecord {
            nome_fantasia: Some("ACME".into()),
            ..Default::default()
        };
        let company = Company::new(&cnpj, branch, base, Vec::new(), None);
        let json = serde_json::to_value(&company).unwrap();
        assert_eq!(json["cnpj"], "12345678000195");
        assert_eq!(json["razao_social"], "ACME LTDA");
        assert_eq!(json["nome_fantasia"], "ACME");
        // absent tax record serializes as unset fields
        assert_eq!(json["opcao_pelo_simples"], serde_json::Value::Null);
        assert!(json["qsa"].as_array().unwrap().is_empty());
    }

    #[test]
    fn empty_page_has_no_cursor() {
        let page = Page::empty();
        assert!(page.data.is_empty());
        assert!(page.cursor.is_none());
    }

    #[test]
    fn absent_and_zero_stay_distinct() {
        let zero = PartnerRecord {
            codigo_pais: Some(0),
            ..Default::default()
        };
        let absent = PartnerRecord::default();
        let zero_json = serde_json::to_value(&zero).unwrap();
        let absent_json = serde_json::to_value(&absent).unwrap();
        assert_eq!(zero_json["codigo_pais"], 0);
        assert_eq!(absent_json["codigo_pais"], serde_json::Value::Null);
        assert_ne!(zero, absent);
    }
}
