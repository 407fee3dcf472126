use crate::cli::args::{Cli, CompletionCommands, CompletionHelperCommands};
use crate::tables::Table;
use crate::utils::errors::Result;
use crate::utils::output::OutputFormat;
use clap::CommandFactory;
use clap_complete::{generate, Shell};
use std::io;

pub fn handle_completion_command(command: &CompletionCommands) -> Result<()> {
    let shell = command.shell();
    let mut cmd = Cli::command();
    let app_name = "crtsh-rs";

    // For bash, complete table and column names through the hidden helper
    if matches!(shell, Shell::Bash) {
        println!("# Enhanced completion for crtsh-rs tables and columns");
        print!(
            r#"
_crtsh_rs_complete_tables() {{
    local tables
    tables=$(crtsh-rs completion-helper tables 2>/dev/null)
    COMPREPLY=($(compgen -W "$tables" -- "${{cur}}"))
}}

_crtsh_rs_complete_columns() {{
    local columns table
    local i
    for ((i = 1; i < ${{#words[@]}}; i++)); do
        if [[ "${{words[$((i-1))]}}" == "query" ]]; then
            table="${{words[$i]}}"
            break
        fi
    done
    [[ -z "$table" ]] && return

    columns=$(crtsh-rs completion-helper columns "$table" 2>/dev/null)

    # Complete the last entry of a comma-separated list, keeping any + prefix
    local current_word="${{cur}}"
    local prefix=""
    if [[ "$current_word" == +* ]]; then
        prefix="+"
        current_word="${{current_word:1}}"
    fi
    if [[ "$current_word" == *,* ]]; then
        prefix="${{prefix}}${{current_word%,*}},"
        current_word="${{current_word##*,}}"
    fi

    local word_list=""
    for col in $columns; do
        if [[ "$col" == "$current_word"* ]]; then
            word_list="$word_list ${{prefix}}${{col}}"
        fi
    done

    COMPREPLY=($(compgen -W "$word_list" -- "${{cur}}"))
}}

_crtsh_rs_override() {{
    local cur prev words cword
    _init_completion || return

    case "$prev" in
        "query"|"columns")
            _crtsh_rs_complete_tables
            return 0
            ;;
        "--columns")
            _crtsh_rs_complete_columns
            return 0
            ;;
    esac

    # Fall back to the generated completion
    _crtsh-rs "$@"
}}

"#
        );

        generate(shell, &mut cmd, app_name, &mut io::stdout());

        println!();
        println!("# Override the completion function");
        println!("complete -F _crtsh_rs_override crtsh-rs");
    } else {
        generate(shell, &mut cmd, app_name, &mut io::stdout());
    }

    Ok(())
}

pub fn handle_completion_helper_command(
    command: &CompletionHelperCommands,
    output: &OutputFormat,
) -> Result<()> {
    match command {
        CompletionHelperCommands::Tables => {
            let names: Vec<&str> = Table::ALL.iter().map(|t| t.name()).collect();
            output.print_list(&names);
        }
        CompletionHelperCommands::Columns { table } => {
            // Unknown tables complete to nothing
            if let Ok(table) = table.parse::<Table>() {
                let names: Vec<&str> = table.definition().columns.iter().map(|c| c.name).collect();
                output.print_list(&names);
            }
        }
    }

    Ok(())
}
