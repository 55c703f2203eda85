//! C5 — OData→SQL translation: `ColumnMap` (§3), alias rewriting, and
//! parameterised SQL emission (§4.5). This is the CORE's largest component
//! by design budget (~22%) and the one most exposed to untrusted input, so
//! every literal value in `$filter` is extracted into a named parameter —
//! nothing untrusted is ever concatenated into the SQL string itself.

use std::collections::HashMap;
use std::fmt::Write as _;

use once_cell::sync::Lazy;
use regex::Regex;

use gateway_core::GatewayError;

/// Bidirectional alias ↔ db-column mapping derived once per endpoint from
/// `allowedColumns` (`spec.md` §3 `ColumnMap`).
#[derive(Debug, Clone, Default)]
pub struct ColumnMap {
	pub alias_to_db: HashMap<String, String>,
	pub db_to_alias: HashMap<String, String>,
}

impl ColumnMap {
	/// Parses `allowedColumns` entries of the form `dbColumn[;alias]`.
	/// Entries with no `;` or an empty alias side fall back to identity.
	/// Malformed entries — empty, whitespace-only, or only separators — are
	/// silently dropped; this must never panic or error on degenerate input
	/// (`spec.md` §3, tested exhaustively by `spec.md` §8 P1).
	pub fn parse(allowed_columns: &[String]) -> ColumnMap {
		let mut map = ColumnMap::default();
		for raw in allowed_columns {
			let trimmed = raw.trim();
			if trimmed.is_empty() {
				continue;
			}
			let mut parts = trimmed.splitn(2, ';');
			let db = parts.next().unwrap_or("").trim();
			let alias_part = parts.next().map(str::trim);
			if db.is_empty() {
				continue;
			}
			let alias = match alias_part {
				Some(a) if !a.is_empty() => a,
				_ => db,
			};
			map.alias_to_db.insert(alias.to_string(), db.to_string());
			map.db_to_alias.insert(db.to_string(), alias.to_string());
		}
		map
	}

	pub fn contains_alias_or_db(&self, name: &str) -> bool {
		self.alias_to_db.contains_key(name) || self.db_to_alias.contains_key(name)
	}
}

/// Token-boundary characters per `spec.md` §4.5: `[A-Za-z0-9_]`.
fn is_ident_char(c: char) -> bool {
	c.is_ascii_alphanumeric() || c == '_'
}

/// Whole-word replacement of every key in `mapping` with its value, honouring
/// `[A-Za-z0-9_]` token boundaries so e.g. key `Code` never matches inside
/// `ProductCode` (`spec.md` §8 P4/scenario 4). Longer keys are tried first so
/// no key can be a partial match consumed by a shorter one sharing a prefix.
fn replace_whole_words(text: &str, mapping: &HashMap<String, String>) -> String {
	let mut keys: Vec<&String> = mapping.keys().collect();
	keys.sort_by_key(|k| std::cmp::Reverse(k.len()));

	let chars: Vec<char> = text.chars().collect();
	let mut out = String::with_capacity(text.len());
	let mut i = 0;
	'outer: while i < chars.len() {
		// Boundary before a candidate match only holds if the preceding char
		// (if any) isn't itself an identifier character.
		let prev_is_boundary = i == 0 || !is_ident_char(chars[i - 1]);
		if prev_is_boundary {
			for key in &keys {
				let klen = key.chars().count();
				if i + klen > chars.len() {
					continue;
				}
				let candidate: String = chars[i..i + klen].iter().collect();
				if &candidate != *key {
					continue;
				}
				let next_is_boundary = i + klen == chars.len() || !is_ident_char(chars[i + klen]);
				if next_is_boundary {
					out.push_str(&mapping[*key]);
					i += klen;
					continue 'outer;
				}
			}
		}
		out.push(chars[i]);
		i += 1;
	}
	out
}

/// Whole-word replacement of `alias → db` occurrences in free-form text
/// (`$filter`/`$orderby` predicates), so that e.g. alias `Code` never
/// matches inside `ProductCode` (`spec.md` §8 P4/scenario 4 word-boundary
/// property).
pub fn rewrite_identifiers(text: &str, map: &ColumnMap) -> String {
	replace_whole_words(text, &map.alias_to_db)
}

/// Whole-word `[bracket]`-quotes every db column name from `map` appearing
/// in `text`. Applied to a `$filter` predicate after alias rewriting and
/// before literal extraction, so the emitted SQL never references a bare
/// (unquoted) identifier (`spec.md` §4.5 "never concatenates untrusted
/// strings without quoting").
fn quote_db_columns(text: &str, map: &ColumnMap) -> String {
	let mapping: HashMap<String, String> = map.db_to_alias.keys().map(|col| (col.clone(), quote_ident(col))).collect();
	replace_whole_words(text, &mapping)
}

/// Rewrites a comma-separated `$select`/`$orderby` column list token-wise,
/// preserving `asc`/`desc` suffixes and comma spacing (`spec.md` §4.5).
pub fn rewrite_column_list(list: &str, map: &ColumnMap) -> String {
	list
		.split(',')
		.map(|entry| {
			let trimmed = entry.trim();
			let mut parts = trimmed.splitn(2, char::is_whitespace);
			let column = parts.next().unwrap_or("");
			let rest = parts.next();
			let rewritten = map.alias_to_db.get(column).cloned().unwrap_or_else(|| column.to_string());
			match rest {
				Some(suffix) => format!("{rewritten} {}", suffix.trim()),
				None => rewritten,
			}
		})
		.collect::<Vec<_>>()
		.join(", ")
}

/// Raw OData query parameters, as taken verbatim off the query string.
#[derive(Debug, Clone, Default)]
pub struct ODataParams {
	pub select: Option<String>,
	pub filter: Option<String>,
	pub orderby: Option<String>,
	pub top: Option<u32>,
	pub skip: Option<u32>,
	pub count: bool,
}

impl ODataParams {
	pub fn from_query_pairs<'a>(pairs: impl Iterator<Item = (&'a str, &'a str)>) -> Result<ODataParams, GatewayError> {
		let mut params = ODataParams::default();
		for (key, value) in pairs {
			match key {
				"$select" => params.select = Some(value.to_string()),
				"$filter" => params.filter = Some(value.to_string()),
				"$orderby" => params.orderby = Some(value.to_string()),
				"$top" => {
					params.top = Some(
						value
							.parse()
							.map_err(|_| GatewayError::input(format!("$top must be a non-negative integer, got {value}")))?,
					)
				},
				"$skip" => {
					params.skip = Some(
						value
							.parse()
							.map_err(|_| GatewayError::input(format!("$skip must be a non-negative integer, got {value}")))?,
					)
				},
				"$count" => params.count = value.eq_ignore_ascii_case("true"),
				_ => {},
			}
		}
		Ok(params)
	}
}

/// SQL identifier quoting: `[schema].[table]`/`[column]`. Never concatenates
/// untrusted strings without quoting (`spec.md` §4.5).
fn quote_ident(ident: &str) -> String {
	format!("[{}]", ident.replace(']', "]]"))
}

/// A single extracted literal, numbered `@p0`, `@p1`, … in first-seen order.
#[derive(Debug, Clone)]
pub struct SqlParam {
	pub name: String,
	pub value: String,
}

/// The output contract: `(sql, params)` — both must be consumed together.
#[derive(Debug, Clone)]
pub struct TranslatedQuery {
	pub sql: String,
	pub count_sql: Option<String>,
	pub params: Vec<SqlParam>,
}

static STRING_LITERAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"'(?:[^']|'')*'").expect("valid regex"));

/// Extracts every OData string literal (`'...'`, with `''` as an escaped
/// quote) from `filter`, replacing each with a `@pN` placeholder. Returns
/// the rewritten predicate plus the ordered list of unquoted/unescaped
/// literal values.
fn extract_literals(filter: &str) -> (String, Vec<String>) {
	let mut values = Vec::new();
	let mut index = 0;
	let rewritten = STRING_LITERAL
		.replace_all(filter, |caps: &regex::Captures| {
			let raw = &caps[0];
			let inner = &raw[1..raw.len() - 1];
			values.push(inner.replace("''", "'"));
			let placeholder = format!("@p{index}");
			index += 1;
			placeholder
		})
		.into_owned();
	(rewritten, values)
}

/// Options controlling identifier validation strictness (`spec.md` §4.5).
pub struct TranslateOptions<'a> {
	pub entity_schema: &'a str,
	pub entity_table: &'a str,
	pub column_map: &'a ColumnMap,
	pub primary_key: Option<&'a str>,
	pub page_size: u32,
	pub strict: bool,
}

/// Translates `params` against `opts` into `(sql, params)`. Errors:
/// malformed OData → `GatewayError::MalformedODataQuery`; references to
/// columns outside `aliasToDb ∪ dbToAlias` under strict mode →
/// `GatewayError::UnknownColumns` listing the offending names.
pub fn translate(params: &ODataParams, opts: &TranslateOptions) -> Result<TranslatedQuery, GatewayError> {
	if let Some(skip) = params.skip
		&& (skip as i64) < 0
	{
		return Err(GatewayError::input("$skip must be >= 0"));
	}

	if opts.strict {
		check_strict_columns(params, opts)?;
	}

	let table_ref = format!("{}.{}", quote_ident(opts.entity_schema), quote_ident(opts.entity_table));

	let cols = match &params.select {
		Some(select) => rewrite_and_quote_select(select, opts.column_map),
		None => "*".to_string(),
	};

	let mut sql_params = Vec::new();
	let where_clause = match &params.filter {
		Some(filter) => {
			let rewritten_alias = rewrite_identifiers(filter, opts.column_map);
			let rewritten_fns = rewrite_string_match_functions(&rewritten_alias);
			let quoted = quote_db_columns(&rewritten_fns, opts.column_map);
			let (with_placeholders, literals) = extract_literals(&quoted);
			let predicate = translate_filter_operators(&with_placeholders);
			for (i, value) in literals.into_iter().enumerate() {
				sql_params.push(SqlParam { name: format!("p{i}"), value });
			}
			Some(predicate)
		},
		None => None,
	};

	let needs_paging = params.top.is_some() || params.skip.is_some();
	let orderby = match &params.orderby {
		Some(orderby) => Some(rewrite_column_list(orderby, opts.column_map)),
		None if needs_paging => Some(match opts.primary_key {
			Some(pk) => quote_ident(pk),
			None => "(SELECT NULL)".to_string(),
		}),
		None => None,
	};

	let top = params.top.map(|t| t.min(opts.page_size)).unwrap_or(opts.page_size);
	let skip = params.skip.unwrap_or(0);

	let mut sql = format!("SELECT {cols} FROM {table_ref}");
	if let Some(ref predicate) = where_clause {
		let _ = write!(sql, " WHERE {predicate}");
	}
	if let Some(ref ord) = orderby {
		let _ = write!(sql, " ORDER BY {ord}");
	}
	if needs_paging {
		let _ = write!(sql, " OFFSET {skip} ROWS FETCH NEXT {top} ROWS ONLY");
	}

	// `$count=true` ignores paging (`spec.md` §4.5, §9 resolved open question):
	// the accompanying count query carries the same filter but no ORDER BY/OFFSET.
	let count_sql = params.count.then(|| {
		let mut count_sql = format!("SELECT COUNT(*) FROM {table_ref}");
		if let Some(ref predicate) = where_clause {
			let _ = write!(count_sql, " WHERE {predicate}");
		}
		count_sql
	});

	Ok(TranslatedQuery {
		sql,
		count_sql,
		params: sql_params,
	})
}

/// OData comparison operators pass through as their SQL equivalents.
/// `eq`/`ne`/`gt`/`ge`/`lt`/`le` map directly; `and`/`or`/`not` are
/// case-sensitive keywords already valid in both grammars, left untouched.
/// Runs *after* literal extraction, so the keywords it matches can never be
/// mistaken for the same words appearing inside a string literal.
fn translate_filter_operators(predicate: &str) -> String {
	static EQ: Lazy<Regex> = Lazy::new(|| Regex::new(r"\beq\b").unwrap());
	static NE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bne\b").unwrap());
	static GT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bgt\b").unwrap());
	static GE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bge\b").unwrap());
	static LT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\blt\b").unwrap());
	static LE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\ble\b").unwrap());

	let mut out = EQ.replace_all(predicate, "=").into_owned();
	out = NE.replace_all(&out, "<>").into_owned();
	out = GE.replace_all(&out, ">=").into_owned();
	out = LE.replace_all(&out, "<=").into_owned();
	out = GT.replace_all(&out, ">").into_owned();
	out = LT.replace_all(&out, "<").into_owned();
	out
}

/// Rewrites `contains(col,'x')` / `startswith(col,'x')` / `endswith(col,'x')`
/// into `col LIKE '%x%'` / `col LIKE 'x%'` / `col LIKE '%x'`, with the `%`
/// wildcards folded into the literal itself (still quoted at this point, not
/// yet a parameter) so the extracted `@pN` value carries the wildcarding —
/// nothing about LIKE-wrapping leaks into the emitted SQL text.
fn rewrite_string_match_functions(predicate: &str) -> String {
	static CONTAINS: Lazy<Regex> =
		Lazy::new(|| Regex::new(r"contains\(\s*([A-Za-z0-9_.\[\]]+)\s*,\s*('(?:[^']|'')*')\s*\)").unwrap());
	static STARTSWITH: Lazy<Regex> =
		Lazy::new(|| Regex::new(r"startswith\(\s*([A-Za-z0-9_.\[\]]+)\s*,\s*('(?:[^']|'')*')\s*\)").unwrap());
	static ENDSWITH: Lazy<Regex> =
		Lazy::new(|| Regex::new(r"endswith\(\s*([A-Za-z0-9_.\[\]]+)\s*,\s*('(?:[^']|'')*')\s*\)").unwrap());

	fn wrap(lit: &str, prefix: bool, suffix: bool) -> String {
		let inner = &lit[1..lit.len() - 1];
		let mut out = String::from("'");
		if prefix {
			out.push('%');
		}
		out.push_str(inner);
		if suffix {
			out.push('%');
		}
		out.push('\'');
		out
	}

	let mut out = CONTAINS
		.replace_all(predicate, |c: &regex::Captures| format!("{} LIKE {}", &c[1], wrap(&c[2], true, true)))
		.into_owned();
	out = STARTSWITH
		.replace_all(&out, |c: &regex::Captures| format!("{} LIKE {}", &c[1], wrap(&c[2], false, true)))
		.into_owned();
	out = ENDSWITH
		.replace_all(&out, |c: &regex::Captures| format!("{} LIKE {}", &c[1], wrap(&c[2], true, false)))
		.into_owned();
	out
}

fn rewrite_and_quote_select(select: &str, map: &ColumnMap) -> String {
	rewrite_column_list(select, map)
		.split(", ")
		.map(|col| {
			let db_col = map.alias_to_db.get(col).cloned().unwrap_or_else(|| col.to_string());
			quote_ident(&db_col)
		})
		.collect::<Vec<_>>()
		.join(", ")
}

/// Strict mode: every identifier referenced by `$select`/`$filter`/`$orderby`
/// must be present in `aliasToDb ∪ dbToAlias`; otherwise `BadRequest` listing
/// the offending names (`spec.md` §4.5).
fn check_strict_columns(params: &ODataParams, opts: &TranslateOptions) -> Result<(), GatewayError> {
	let mut unknown = Vec::new();
	if let Some(select) = &params.select {
		for col in select.split(',').map(str::trim).filter(|c| !c.is_empty()) {
			if !opts.column_map.contains_alias_or_db(col) {
				unknown.push(col.to_string());
			}
		}
	}
	if let Some(orderby) = &params.orderby {
		for entry in orderby.split(',') {
			let col = entry.trim().split_whitespace().next().unwrap_or("");
			if !col.is_empty() && !opts.column_map.contains_alias_or_db(col) {
				unknown.push(col.to_string());
			}
		}
	}
	if let Some(filter) = &params.filter {
		unknown.extend(unknown_filter_identifiers(filter, opts.column_map));
	}
	if unknown.is_empty() {
		Ok(())
	} else {
		unknown.sort();
		unknown.dedup();
		Err(GatewayError::UnknownColumns(unknown))
	}
}

static IDENT_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*").unwrap());
static ODATA_KEYWORDS: &[&str] = &[
	"and", "or", "not", "eq", "ne", "gt", "ge", "lt", "le", "contains", "startswith", "endswith", "true", "false",
];

fn unknown_filter_identifiers(filter: &str, map: &ColumnMap) -> Vec<String> {
	// Strip string literals first so identifier-shaped words inside them
	// (e.g. `'eq'`) aren't mistaken for column references.
	let stripped = STRING_LITERAL.replace_all(filter, "''");
	IDENT_TOKEN
		.find_iter(&stripped)
		.map(|m| m.as_str())
		.filter(|tok| !ODATA_KEYWORDS.contains(&tok.to_ascii_lowercase().as_str()))
		.filter(|tok| !map.contains_alias_or_db(tok))
		.map(str::to_string)
		.collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn column_map() -> ColumnMap {
		ColumnMap::parse(&[
			"ItemCode;ProductNumber".to_string(),
			"Description".to_string(),
			"Assortment;".to_string(),
			"".to_string(),
			"   ".to_string(),
			";".to_string(),
			"Field1;Field2;Field3".to_string(),
		])
	}

	/// `spec.md` §8 scenario 1.
	#[test]
	fn alias_parsing_matches_scenario_1() {
		let map = column_map();
		assert_eq!(map.alias_to_db.get("ProductNumber"), Some(&"ItemCode".to_string()));
		assert_eq!(map.alias_to_db.get("Description"), Some(&"Description".to_string()));
		assert_eq!(map.alias_to_db.get("Assortment"), Some(&"Assortment".to_string()));
		assert_eq!(map.alias_to_db.get("Field1"), Some(&"Field1".to_string()));
		assert_eq!(map.alias_to_db.len(), 4);
	}

	/// `spec.md` §8 P1: degenerate entries never panic and add no mappings.
	#[test]
	fn degenerate_inputs_produce_zero_mappings() {
		for input in ["", "   ", ";", ";;", " ; ", ";;;"] {
			let map = ColumnMap::parse(&[input.to_string()]);
			assert!(map.alias_to_db.is_empty(), "input {input:?} should add nothing");
		}
	}

	/// `spec.md` §8 P1: `aliasToDb[dbToAlias[c]] == c` for every configured `c`.
	#[test]
	fn alias_to_db_and_db_to_alias_are_mutual_inverses() {
		let map = column_map();
		for (db, alias) in &map.db_to_alias {
			assert_eq!(map.alias_to_db.get(alias), Some(db));
		}
	}

	/// `spec.md` §8 scenario 2.
	#[test]
	fn filter_rewrite_matches_scenario_2() {
		let map = ColumnMap::parse(&["ItemCode;ProductNumber".to_string(), "Assortment;AssortmentID".to_string()]);
		let filter = "contains(ProductNumber,'PROD') and (AssortmentID eq 'Electronics' or AssortmentID eq 'Books')";
		let rewritten = rewrite_identifiers(filter, &map);
		assert_eq!(
			rewritten,
			"contains(ItemCode,'PROD') and (Assortment eq 'Electronics' or Assortment eq 'Books')"
		);
	}

	/// `spec.md` §8 scenario 3.
	#[test]
	fn orderby_rewrite_matches_scenario_3() {
		let map = ColumnMap::parse(&["ItemCode;ProductNumber".to_string(), "Assortment;AssortmentID".to_string()]);
		let rewritten = rewrite_column_list("ProductNumber desc, AssortmentID asc", &map);
		assert_eq!(rewritten, "ItemCode desc, Assortment asc");
	}

	/// `spec.md` §8 P4 / scenario 4: word-boundary property — `Code` must not
	/// match inside `ProductCode`.
	#[test]
	fn rewrite_respects_word_boundaries() {
		let map = ColumnMap::parse(&["ItemCode;Code".to_string()]);
		let rewritten = rewrite_identifiers("ProductCode eq 'X'", &map);
		assert_eq!(rewritten, "ProductCode eq 'X'");
	}

	fn opts<'a>(map: &'a ColumnMap, pk: Option<&'a str>) -> TranslateOptions<'a> {
		TranslateOptions {
			entity_schema: "dbo",
			entity_table: "Items",
			column_map: map,
			primary_key: pk,
			page_size: 50,
			strict: false,
		}
	}

	/// `spec.md` §8 scenario 4: single equality filter.
	#[test]
	fn emits_parameterised_equality_filter() {
		let map = ColumnMap::parse(&["ItemCode".to_string()]);
		let params = ODataParams {
			filter: Some("ItemCode eq 'TEST001'".to_string()),
			..Default::default()
		};
		let result = translate(&params, &opts(&map, None)).unwrap();
		assert_eq!(result.sql, "SELECT * FROM [dbo].[Items] WHERE [ItemCode] = @p0");
		assert_eq!(result.params.len(), 1);
		assert_eq!(result.params[0].name, "p0");
		assert_eq!(result.params[0].value, "TEST001");
	}

	/// `spec.md` §8 P5: empty OData map round-trips to `SELECT * FROM ...`.
	#[test]
	fn empty_params_yield_select_star_with_no_params() {
		let map = ColumnMap::default();
		let params = ODataParams::default();
		let result = translate(&params, &opts(&map, None)).unwrap();
		assert_eq!(result.sql, "SELECT * FROM [dbo].[Items]");
		assert!(result.params.is_empty());
		assert!(result.count_sql.is_none());
	}

	#[test]
	fn skip_without_orderby_synthesizes_primary_key_order() {
		let map = ColumnMap::default();
		let params = ODataParams {
			skip: Some(10),
			top: Some(5),
			..Default::default()
		};
		let result = translate(&params, &opts(&map, Some("ID"))).unwrap();
		assert!(result.sql.contains("ORDER BY [ID]"));
		assert!(result.sql.contains("OFFSET 10 ROWS FETCH NEXT 5 ROWS ONLY"));
	}

	#[test]
	fn skip_without_orderby_or_primary_key_uses_select_null() {
		let map = ColumnMap::default();
		let params = ODataParams {
			skip: Some(0),
			top: Some(5),
			..Default::default()
		};
		let result = translate(&params, &opts(&map, None)).unwrap();
		assert!(result.sql.contains("ORDER BY (SELECT NULL)"));
	}

	#[test]
	fn top_is_clamped_to_page_size() {
		let map = ColumnMap::default();
		let params = ODataParams {
			top: Some(1000),
			skip: Some(0),
			..Default::default()
		};
		let result = translate(&params, &opts(&map, Some("ID"))).unwrap();
		assert!(result.sql.contains("FETCH NEXT 50 ROWS ONLY"));
	}

	#[test]
	fn negative_skip_is_rejected() {
		let map = ColumnMap::default();
		let params = ODataParams {
			skip: Some(0),
			..Default::default()
		};
		assert!(translate(&params, &opts(&map, None)).is_ok());
		// u32 can't represent negative directly; the parse step in
		// `ODataParams::from_query_pairs` is what actually rejects "-1".
		assert!(ODataParams::from_query_pairs(std::iter::once(("$skip", "-1"))).is_err());
	}

	#[test]
	fn count_true_adds_companion_query_ignoring_paging() {
		let map = ColumnMap::default();
		let params = ODataParams {
			count: true,
			top: Some(5),
			skip: Some(10),
			..Default::default()
		};
		let result = translate(&params, &opts(&map, Some("ID"))).unwrap();
		let count_sql = result.count_sql.expect("count query present");
		assert_eq!(count_sql, "SELECT COUNT(*) FROM [dbo].[Items]");
		assert!(!count_sql.contains("OFFSET"));
	}

	#[test]
	fn strict_mode_rejects_unknown_columns() {
		let map = ColumnMap::parse(&["ItemCode;Code".to_string()]);
		let mut strict_opts = opts(&map, None);
		strict_opts.strict = true;
		let params = ODataParams {
			filter: Some("Bogus eq 'X'".to_string()),
			..Default::default()
		};
		let err = translate(&params, &strict_opts).unwrap_err();
		match err {
			GatewayError::UnknownColumns(cols) => assert_eq!(cols, vec!["Bogus".to_string()]),
			other => panic!("expected UnknownColumns, got {other:?}"),
		}
	}

	#[test]
	fn string_literal_escaping_is_unescaped() {
		let map = ColumnMap::default();
		let params = ODataParams {
			filter: Some("Name eq 'O''Brien'".to_string()),
			..Default::default()
		};
		let result = translate(&params, &opts(&map, None)).unwrap();
		assert_eq!(result.params[0].value, "O'Brien");
	}
}
